

#[cfg(test)]
mod tests {
    use crate::grammar;
    use crate::ast::*;
    use BinOp::*;

    fn assert_parses_to(text: &'static str, ast: Expr) {
        assert_eq!(
            grammar::ExprParser::new().parse(text).unwrap(),
            ast
        );
    }

    fn assert_program_parses(text: &'static str) {
        assert!(grammar::ProgramParser::new().parse(text).is_ok(), "{}", text);
    }

    #[test]
    fn test_terms() {
        assert_parses_to("42", int(42));
        assert_parses_to("42.5", Expr::Literal(Literal::Float(42.5)));
        assert_parses_to("(42)", Expr::Group(Node::new(int(42))));
        assert_parses_to("foo", ident("foo"));
        assert_parses_to("'c'", Expr::Literal(Literal::Char(b'c')));
        assert_parses_to("'\\n'", Expr::Literal(Literal::Char(b'\n')));
        assert_parses_to("\"abc\"", Expr::Literal(Literal::Str("abc".to_string())));
        assert_parses_to("true", Expr::Literal(Literal::Bool(true)));
        assert_parses_to("nil", Expr::Literal(Literal::Nil));
    }

    #[test]
    fn test_precedence() {
        assert_parses_to("1 + 2 * 3", bin(Add, int(1), bin(Mul, int(2), int(3))));
        assert_parses_to("1 * 2 + 3", bin(Add, bin(Mul, int(1), int(2)), int(3)));
        assert_parses_to("1 - 2 - 3", bin(Sub, bin(Sub, int(1), int(2)), int(3)));
        assert_parses_to("1 | 2 ^ 3", bin(BitOr, int(1), bin(BitXor, int(2), int(3))));
        assert_parses_to("1 ^ 2 & 3", bin(BitXor, int(1), bin(BitAnd, int(2), int(3))));
        assert_parses_to("1 & 2 << 3", bin(BitAnd, int(1), bin(Shl, int(2), int(3))));
        assert_parses_to("1 << 2 + 3", bin(Shl, int(1), bin(Add, int(2), int(3))));
    }

    #[test]
    fn test_relational() {
        assert_parses_to("3 + 4 < 3 * 4", bin(
            Lt,
            bin(Add, int(3), int(4)),
            bin(Mul, int(3), int(4))
        ));

        assert_parses_to("3 + 4 >= 3 * 4", bin(
            Gte,
            bin(Add, int(3), int(4)),
            bin(Mul, int(3), int(4))
        ));

        assert_parses_to("3 + 4 == 3 * 4", bin(
            Eq,
            bin(Add, int(3), int(4)),
            bin(Mul, int(3), int(4))
        ));

        assert_parses_to("1 < 2 == true", bin(
            Eq,
            bin(Lt, int(1), int(2)),
            Expr::Literal(Literal::Bool(true))
        ));
    }

    #[test]
    fn test_logical() {
        assert_parses_to("a && b || c", Expr::Logical {
            left: Node::new(Expr::Logical {
                left: Node::new(ident("a")),
                op: LogicalOp::And,
                right: Node::new(ident("b")),
            }),
            op: LogicalOp::Or,
            right: Node::new(ident("c")),
        });
    }

    #[test]
    fn test_unary() {
        assert_parses_to("-1", Expr::Unary { op: UnOp::Neg, operand: Node::new(int(1)) });
        assert_parses_to("!ok", Expr::Unary { op: UnOp::Not, operand: Node::new(ident("ok")) });
        assert_parses_to("~0", Expr::Unary { op: UnOp::Tilde, operand: Node::new(int(0)) });
        assert_parses_to(
            "-x + y",
            bin(
                Add,
                Expr::Unary { op: UnOp::Neg, operand: Node::new(ident("x")) },
                ident("y"),
            ),
        );
    }

    #[test]
    fn test_postfix() {
        assert_parses_to("f(1, 2)", Expr::Call {
            callee: Node::new(ident("f")),
            args: vec![int(1), int(2)],
        });

        assert_parses_to("a[0]", Expr::ArrayMember {
            receiver: Node::new(ident("a")),
            indices: vec![int(0)],
        });

        // Consecutive index levels collapse into one access.
        assert_parses_to("m[1][2]", Expr::ArrayMember {
            receiver: Node::new(ident("m")),
            indices: vec![int(1), int(2)],
        });

        assert_parses_to("n++", Expr::Update {
            operand: Node::new(ident("n")),
            op: UpdateOp::Inc,
        });

        assert_parses_to("p.x", Expr::Member {
            receiver: Node::new(ident("p")),
            name: "x".to_string(),
        });
    }

    #[test]
    fn test_assignment() {
        assert_parses_to("x = 1", Expr::Assign {
            target: Node::new(ident("x")),
            op: AssignOp::Assign,
            value: Node::new(int(1)),
        });

        assert_parses_to("x += 1", Expr::Assign {
            target: Node::new(ident("x")),
            op: AssignOp::Add,
            value: Node::new(int(1)),
        });

        assert_parses_to("a[0] = 1", Expr::Assign {
            target: Node::new(Expr::ArrayMember {
                receiver: Node::new(ident("a")),
                indices: vec![int(0)],
            }),
            op: AssignOp::Assign,
            value: Node::new(int(1)),
        });

        // Right-associative: x = y = 1.
        assert_parses_to("x = y = 1", Expr::Assign {
            target: Node::new(ident("x")),
            op: AssignOp::Assign,
            value: Node::new(Expr::Assign {
                target: Node::new(ident("y")),
                op: AssignOp::Assign,
                value: Node::new(int(1)),
            }),
        });
    }

    #[test]
    fn test_assignment_target_must_be_lvalue() {
        assert!(grammar::ExprParser::new().parse("1 = 2").is_err());
        assert!(grammar::ExprParser::new().parse("f() = 2").is_err());
    }

    #[test]
    fn test_conditional() {
        assert_parses_to("c ? 1 : 2", Expr::Conditional {
            cond: Node::new(ident("c")),
            then_expr: Node::new(int(1)),
            else_expr: Some(Node::new(int(2))),
        });
    }

    #[test]
    fn test_array_init() {
        assert_parses_to("int[3]{1, 2, 3}", Expr::ArrayInit {
            ty: Type::Array { dims: vec![3], elem: Node::new(Type::Int) },
            elements: vec![int(1), int(2), int(3)],
        });

        assert_parses_to("int[]{1, 2}", Expr::ArrayInit {
            ty: Type::Array { dims: vec![0], elem: Node::new(Type::Int) },
            elements: vec![int(1), int(2)],
        });

        assert_parses_to("float[2][2]{}", Expr::ArrayInit {
            ty: Type::Array { dims: vec![2, 2], elem: Node::new(Type::Float) },
            elements: vec![],
        });
    }

    #[test]
    fn test_cast() {
        assert_parses_to("int(\"42\")", Expr::Cast {
            target: Node::new(Expr::Literal(Literal::Str("42".to_string()))),
            ty: Type::Int,
        });

        assert_parses_to("string('c')", Expr::Cast {
            target: Node::new(Expr::Literal(Literal::Char(b'c'))),
            ty: Type::Str,
        });
    }

    #[test]
    fn test_anonymous_function() {
        assert_parses_to("func (x: int) -> int { return x; }", Expr::Function {
            params: vec![FieldDecl { name: "x".to_string(), ty: Type::Int }],
            returns: vec![Type::Int],
            body: Node::new(Stmt::Block(vec![Decl::Stmt(Stmt::Return(Some(ident("x"))))])),
        });
    }

    #[test]
    fn test_declarations() {
        let program = grammar::ProgramParser::new()
            .parse("let x: int = 1; let y = 2.5; let z: string;")
            .unwrap();
        assert_eq!(program, vec![
            Decl::Let { name: "x".to_string(), ty: Some(Type::Int), init: Some(int(1)) },
            Decl::Let {
                name: "y".to_string(),
                ty: None,
                init: Some(Expr::Literal(Literal::Float(2.5))),
            },
            Decl::Let { name: "z".to_string(), ty: Some(Type::Str), init: None },
        ]);
    }

    #[test]
    fn test_function_declaration() {
        let program = grammar::ProgramParser::new()
            .parse("func add(a: int, b: int) -> int { return a + b; }")
            .unwrap();
        assert_eq!(program, vec![Decl::Function {
            name: "add".to_string(),
            params: vec![
                FieldDecl { name: "a".to_string(), ty: Type::Int },
                FieldDecl { name: "b".to_string(), ty: Type::Int },
            ],
            returns: vec![Type::Int],
            body: Stmt::Block(vec![Decl::Stmt(Stmt::Return(Some(bin(
                Add,
                ident("a"),
                ident("b"),
            ))))]),
        }]);
    }

    #[test]
    fn test_function_type_annotation() {
        let program = grammar::ProgramParser::new()
            .parse("let f: func(int) -> int;")
            .unwrap();
        assert_eq!(program, vec![Decl::Let {
            name: "f".to_string(),
            ty: Some(Type::Function { params: vec![Type::Int], returns: vec![Type::Int] }),
            init: None,
        }]);
    }

    #[test]
    fn test_statements() {
        assert_program_parses("if (a < b) { println(a); }");
        assert_program_parses("if (a < b) { } else { }");
        assert_program_parses("if (a < b) { } else if (a > b) { } else { }");
        assert_program_parses("while (true) { break; }");
        assert_program_parses("while (true) { continue; }");
        assert_program_parses("for (let i = 0; i < 10; i = i + 1) { }");
        assert_program_parses("for (i = 0; i < 10; i = i + 1) { }");
        assert_program_parses("return;");
        assert_program_parses("return 1 + 2;");
        assert_program_parses("{ let x = 1; println(x); }");
    }

    #[test]
    fn test_comments_are_skipped() {
        assert_program_parses(
            "// a leading comment\nlet x = 1; // a trailing comment\nprintln(x);\n// the end",
        );
    }

    #[test]
    fn test_parse_errors() {
        assert!(grammar::ProgramParser::new().parse("let = 1;").is_err());
        assert!(grammar::ProgramParser::new().parse("if a { }").is_err());
        assert!(grammar::ProgramParser::new().parse("1 +").is_err());
        assert!(grammar::ProgramParser::new().parse("let x = 99999999999999;").is_err());
    }
}

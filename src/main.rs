// Rose: a featherweight scripting language.
//
// Copyright (C) 2019  Brandon Lewis
//
// This program is free software: you can redistribute it and/or
// modify it under the terms of the GNU Lesser General Public License
// as published by the Free Software Foundation, either version 3 of
// the License, or (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the GNU
// Lesser General Public License for more details.
//
// You should have received a copy of the GNU Lesser General Public
// License along with this program.  If not, see
// <https://www.gnu.org/licenses/>.

use std::{env::args, fs, process};

use rose::grammar;
use rose::interpreter::{self, Status};

fn main() {
    let path = args().nth(1).expect("usage: rose <script>");
    let source = fs::read_to_string(&path).expect("couldn't read script");

    let program = match grammar::ProgramParser::new().parse(&source) {
        Ok(program) => program,
        Err(error) => {
            eprintln!("{}: {}", path, error);
            process::exit(1);
        }
    };

    match interpreter::eval(&program) {
        Status::Success => {}
        Status::Failure => process::exit(1),
    }
}

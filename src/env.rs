use crate::map::Map;
use std::cell::RefCell;
use std::rc::Rc;


// Shared handle for environment frames and the values they hold.
// Closures keep their defining frame alive through this.
pub type Handle<T> = Rc<T>;


// Datastructure to manage lexical scoping.
//
// A frame maps names to handles and optionally points at the frame
// it was opened inside of. Frames are created on function and block
// entry and dropped on exit; a child never outlives its parent.
pub struct Env<T> {
    scope: RefCell<Map<Handle<T>>>,
    parent: Option<Handle<Env<T>>>,
}

impl<T> Env<T> {
    fn new(parent: Option<Handle<Env<T>>>) -> Env<T> {
        let scope = RefCell::new(Map::new());
        Env { scope, parent }
    }

    pub fn root() -> Env<T> {
        Self::new(None)
    }

    pub fn chain(parent: &Handle<Env<T>>) -> Env<T> {
        Self::new(Some(parent.clone()))
    }

    // Insert a binding in the current frame, shadowing any outer one.
    pub fn define(&self, key: &str, value: Handle<T>) {
        self.scope.borrow_mut().put(key, value);
    }

    // Look up an identifier from anywhere in our scope chain.
    pub fn get(&self, key: &str) -> Option<Handle<T>> {
        if let Some(value) = self.scope.borrow().get(key) {
            Some(value.clone())
        } else if let Some(env) = &self.parent {
            env.get(key)
        } else {
            None
        }
    }

    // Overwrite the binding in the nearest enclosing frame that
    // holds `key`. Reports whether any frame did.
    pub fn assign(&self, key: &str, value: Handle<T>) -> bool {
        if self.scope.borrow().contains_key(key) {
            self.scope.borrow_mut().put(key, value);
            true
        } else if let Some(env) = &self.parent {
            env.assign(key, value)
        } else {
            false
        }
    }

    // Check the current frame only; shadowing checks use this.
    pub fn exists(&self, key: &str) -> bool {
        self.scope.borrow().contains_key(key)
    }
}

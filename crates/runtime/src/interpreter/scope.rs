use std::{cell::RefCell, rc::Rc};

use rustc_hash::FxHashMap;

use crate::value::{ObjectRef, Value};

pub type ScopeRef = Rc<RefCell<Scope>>;

enum Bindings {
    /// The global scope stores its variables as properties of the global object.
    Global(ObjectRef),
    Declarative(FxHashMap<String, Value>),
}

/// One link of the scope chain.
pub struct Scope {
    bindings: Bindings,
    parent: Option<ScopeRef>,
}

impl Scope {
    pub fn global(object: ObjectRef) -> ScopeRef {
        Rc::new(RefCell::new(Self { bindings: Bindings::Global(object), parent: None }))
    }

    pub fn child(parent: &ScopeRef) -> ScopeRef {
        Rc::new(RefCell::new(Self {
            bindings: Bindings::Declarative(FxHashMap::default()),
            parent: Some(parent.clone()),
        }))
    }

    fn get_local(&self, name: &str) -> Option<Value> {
        match &self.bindings {
            Bindings::Global(object) => object.get(name),
            Bindings::Declarative(vars) => vars.get(name).cloned(),
        }
    }

    fn has_local(&self, name: &str) -> bool {
        match &self.bindings {
            Bindings::Global(object) => object.has(name),
            Bindings::Declarative(vars) => vars.contains_key(name),
        }
    }

    /// Create a binding in this scope. An existing binding keeps its value.
    pub fn declare(&mut self, name: &str) {
        if !self.has_local(name) {
            self.define(name, Value::Undefined);
        }
    }

    /// Create or overwrite a binding in this scope.
    pub fn define(&mut self, name: &str, value: Value) {
        match &mut self.bindings {
            Bindings::Global(object) => object.borrow_mut().set(name, value),
            Bindings::Declarative(vars) => {
                vars.insert(name.to_string(), value);
            }
        }
    }
}

/// Resolve `name` along the chain starting at `scope`.
pub fn lookup(scope: &ScopeRef, name: &str) -> Option<Value> {
    let mut current = Some(scope.clone());
    while let Some(link) = current {
        let link = link.borrow();
        if let Some(value) = link.get_local(name) {
            return Some(value);
        }
        current = link.parent.clone();
    }
    None
}

/// Assign to the nearest binding of `name`, creating a global one when there is none.
pub fn assign(scope: &ScopeRef, name: &str, value: Value) {
    let mut current = scope.clone();
    loop {
        let parent = {
            let link = current.borrow();
            if link.has_local(name) {
                None
            } else {
                link.parent.clone()
            }
        };
        match parent {
            Some(parent) => current = parent,
            None => break,
        }
    }
    current.borrow_mut().define(name, value);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::{Object, ObjectKind};

    #[test]
    fn test_chain_resolution() {
        let global_object = ObjectRef::new(Object::new(ObjectKind::Ordinary, None));
        let global = Scope::global(global_object.clone());
        global.borrow_mut().define("a", Value::from(1.0));
        let inner = Scope::child(&global);
        inner.borrow_mut().define("b", Value::from(2.0));

        assert_eq!(lookup(&inner, "a"), Some(Value::Number(1.0)));
        assert_eq!(lookup(&global, "b"), None);

        assign(&inner, "a", Value::from(3.0));
        assert_eq!(global_object.get("a"), Some(Value::Number(3.0)));

        // Unresolved names become globals.
        assign(&inner, "c", Value::Null);
        assert_eq!(global_object.get("c"), Some(Value::Null));

        inner.borrow_mut().declare("b");
        assert_eq!(lookup(&inner, "b"), Some(Value::Number(2.0)));
    }
}

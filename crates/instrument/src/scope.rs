use esprof_syntax::Statement;

/// The function a scope frame belongs to.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FunctionInfo {
    /// Declared name, or `<anonymous>`.
    pub name: String,
    /// Location string of the whole function.
    pub location: String,
}

/// One lexical function scope, or the program itself.
#[derive(Debug, Default)]
pub struct ScopeFrame {
    /// `None` for the program frame.
    pub function: Option<FunctionInfo>,
    /// Definition statements that run when the scope is entered.
    pub deferred: Vec<Statement>,
    /// Temporaries that need a `var` in this scope.
    pub temps: Vec<String>,
}

impl ScopeFrame {
    pub fn new(function: Option<FunctionInfo>) -> Self {
        Self { function, ..Default::default() }
    }

    /// Statements to place at the top of the scope's body, in execution order.
    pub fn into_prologue(self) -> Vec<Statement> {
        let mut prologue = Vec::with_capacity(self.deferred.len() + 1);
        if !self.temps.is_empty() {
            prologue.push(Statement::declare(self.temps));
        }
        prologue.extend(self.deferred);
        prologue
    }
}

/// LIFO stack of scope frames, one per lexical nesting level.
#[derive(Debug, Default)]
pub struct ScopeStack {
    frames: Vec<ScopeFrame>,
}

impl ScopeStack {
    pub fn push(&mut self, frame: ScopeFrame) {
        self.frames.push(frame);
    }

    pub fn pop(&mut self) -> Option<ScopeFrame> {
        self.frames.pop()
    }

    pub fn current_mut(&mut self) -> Option<&mut ScopeFrame> {
        self.frames.last_mut()
    }

    /// The innermost enclosing function, if the walk is inside one.
    pub fn current_function(&self) -> Option<&FunctionInfo> {
        self.frames.last().and_then(|frame| frame.function.as_ref())
    }

    pub fn depth(&self) -> usize {
        self.frames.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use esprof_syntax::{print, Expression, Program};

    #[test]
    fn test_prologue_declares_temps_first() {
        let mut frame = ScopeFrame::new(None);
        frame.deferred.push(Statement::expression(Expression::identifier("defined")));
        frame.temps.push("esprof$tmp0".to_string());
        frame.temps.push("esprof$tmp1".to_string());
        let program = Program { body: frame.into_prologue(), loc: None };
        assert_eq!(print(&program), "var esprof$tmp0, esprof$tmp1;\ndefined;\n");
    }

    #[test]
    fn test_stack_discipline() {
        let mut stack = ScopeStack::default();
        stack.push(ScopeFrame::new(None));
        assert!(stack.current_function().is_none());
        stack.push(ScopeFrame::new(Some(FunctionInfo {
            name: "f".to_string(),
            location: "a.js@1.0-1.10".to_string(),
        })));
        assert_eq!(stack.current_function().map(|f| f.name.as_str()), Some("f"));
        assert_eq!(stack.depth(), 2);
        stack.pop();
        assert!(stack.current_function().is_none());
    }
}

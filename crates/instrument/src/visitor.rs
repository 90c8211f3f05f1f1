//! A combined pre-order/post-order rewriting walk over the syntax tree.
//!
//! For every node kind there is an `enter_*` hook, called with a mutable reference before the
//! node's children are walked, and a `leave_*` hook, called with the node by value after its
//! children were walked. Whatever `leave_*` returns replaces the node in its parent.
//!
//! Expression leave hooks also receive the [`NodeId`] of the slot the expression was taken
//! from, which is the same identity a parent computed with [`NodeId::of`] while entering.

use esprof_syntax::*;
use paste::paste;

/// Identity of an expression slot for the duration of one walk.
///
/// Child expressions live behind `Box` or inside a `Vec`, so their address does not change
/// while the parent is being rewritten.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct NodeId(usize);

impl NodeId {
    pub fn of(node: &Expression) -> Self {
        Self(node as *const Expression as usize)
    }
}

macro_rules! rewriter {
    (
        statements { $($stmt:ident => $stmt_variant:ident($stmt_ty:ty)),* $(,)? }
        expressions { $($expr:ident => $expr_variant:ident($expr_ty:ty)),* $(,)? }
    ) => {
        paste! {
            pub trait Rewriter {
                fn enter_program(&mut self, _program: &mut Program) {}
                fn leave_program(&mut self, _program: &mut Program) {}

                /// Called for function declarations and function expressions alike, around
                /// the walk of the body.
                fn enter_function(&mut self, _function: &mut Function) {}
                fn leave_function(&mut self, _function: &mut Function) {}

                $(
                    fn [<enter_ $stmt>](&mut self, _node: &mut $stmt_ty) {}
                    fn [<leave_ $stmt>](&mut self, node: $stmt_ty) -> Statement {
                        Statement::$stmt_variant(node)
                    }
                )*

                $(
                    fn [<enter_ $expr>](&mut self, _node: &mut $expr_ty) {}
                    fn [<leave_ $expr>](&mut self, _id: NodeId, node: $expr_ty) -> Expression {
                        Expression::$expr_variant(node)
                    }
                )*
            }
        }
    };
}

rewriter! {
    statements {
        expression_statement => ExpressionStatement(ExpressionStatement),
        variable_declaration => VariableDeclaration(VariableDeclaration),
        function_declaration => FunctionDeclaration(Function),
        return_statement => ReturnStatement(ReturnStatement),
        if_statement => IfStatement(IfStatement),
        block_statement => BlockStatement(BlockStatement),
        for_statement => ForStatement(ForStatement),
        for_in_statement => ForInStatement(ForInStatement),
        while_statement => WhileStatement(WhileStatement),
        do_while_statement => DoWhileStatement(DoWhileStatement),
        break_statement => BreakStatement(JumpStatement),
        continue_statement => ContinueStatement(JumpStatement),
        throw_statement => ThrowStatement(ThrowStatement),
        try_statement => TryStatement(TryStatement),
        empty_statement => EmptyStatement(EmptyStatement),
        switch_statement => SwitchStatement(SwitchStatement),
        labeled_statement => LabeledStatement(LabeledStatement),
    }
    expressions {
        identifier => Identifier(Identifier),
        literal => Literal(Literal),
        this_expression => ThisExpression(ThisExpression),
        array_expression => ArrayExpression(ArrayExpression),
        object_expression => ObjectExpression(ObjectExpression),
        function_expression => FunctionExpression(Function),
        unary_expression => UnaryExpression(UnaryExpression),
        update_expression => UpdateExpression(UpdateExpression),
        binary_expression => BinaryExpression(BinaryExpression),
        logical_expression => LogicalExpression(LogicalExpression),
        assignment_expression => AssignmentExpression(AssignmentExpression),
        conditional_expression => ConditionalExpression(ConditionalExpression),
        call_expression => CallExpression(CallExpression),
        new_expression => NewExpression(CallExpression),
        member_expression => MemberExpression(MemberExpression),
        sequence_expression => SequenceExpression(SequenceExpression),
    }
}

pub trait Walk {
    fn walk(&mut self, rewriter: &mut dyn Rewriter);
}

macro_rules! rewrite {
    // Enter the node, walk its children, then hand it to the leave hook.
    ($rewriter:ident, $kind:ident, $node:ident $(, $id:ident)? => $children:block) => {{
        let mut $node = $node;
        paste! { $rewriter.[<enter_ $kind>](&mut $node); }
        $children
        paste! { $rewriter.[<leave_ $kind>]($($id,)? $node) }
    }};
}

impl<T: Walk> Walk for Vec<T> {
    fn walk(&mut self, rewriter: &mut dyn Rewriter) {
        for node in self.iter_mut() {
            node.walk(rewriter);
        }
    }
}

impl<T: Walk> Walk for Option<T> {
    fn walk(&mut self, rewriter: &mut dyn Rewriter) {
        if let Some(node) = self {
            node.walk(rewriter);
        }
    }
}

impl<T: Walk> Walk for Box<T> {
    fn walk(&mut self, rewriter: &mut dyn Rewriter) {
        (**self).walk(rewriter);
    }
}

impl Walk for Program {
    fn walk(&mut self, rewriter: &mut dyn Rewriter) {
        rewriter.enter_program(self);
        self.body.walk(rewriter);
        rewriter.leave_program(self);
    }
}

impl Walk for Function {
    fn walk(&mut self, rewriter: &mut dyn Rewriter) {
        rewriter.enter_function(self);
        self.body.body.walk(rewriter);
        rewriter.leave_function(self);
    }
}

impl Walk for VariableDeclaration {
    fn walk(&mut self, rewriter: &mut dyn Rewriter) {
        for declarator in &mut self.declarations {
            declarator.init.walk(rewriter);
        }
    }
}

impl Walk for ForInit {
    fn walk(&mut self, rewriter: &mut dyn Rewriter) {
        match self {
            Self::VariableDeclaration(declaration) => declaration.walk(rewriter),
            Self::Expression(expression) => expression.walk(rewriter),
        }
    }
}

impl Walk for Statement {
    fn walk(&mut self, rewriter: &mut dyn Rewriter) {
        let statement = std::mem::replace(self, Self::EmptyStatement(EmptyStatement::default()));
        *self = match statement {
            Self::ExpressionStatement(node) => {
                rewrite!(rewriter, expression_statement, node => { node.expression.walk(rewriter); })
            }
            Self::VariableDeclaration(node) => {
                rewrite!(rewriter, variable_declaration, node => { node.walk(rewriter); })
            }
            Self::FunctionDeclaration(node) => {
                rewrite!(rewriter, function_declaration, node => { node.walk(rewriter); })
            }
            Self::ReturnStatement(node) => {
                rewrite!(rewriter, return_statement, node => { node.argument.walk(rewriter); })
            }
            Self::IfStatement(node) => rewrite!(rewriter, if_statement, node => {
                node.test.walk(rewriter);
                node.consequent.walk(rewriter);
                node.alternate.walk(rewriter);
            }),
            Self::BlockStatement(node) => {
                rewrite!(rewriter, block_statement, node => { node.body.walk(rewriter); })
            }
            Self::ForStatement(node) => rewrite!(rewriter, for_statement, node => {
                node.init.walk(rewriter);
                node.test.walk(rewriter);
                node.update.walk(rewriter);
                node.body.walk(rewriter);
            }),
            Self::ForInStatement(node) => rewrite!(rewriter, for_in_statement, node => {
                node.left.walk(rewriter);
                node.right.walk(rewriter);
                node.body.walk(rewriter);
            }),
            Self::WhileStatement(node) => rewrite!(rewriter, while_statement, node => {
                node.test.walk(rewriter);
                node.body.walk(rewriter);
            }),
            Self::DoWhileStatement(node) => rewrite!(rewriter, do_while_statement, node => {
                node.body.walk(rewriter);
                node.test.walk(rewriter);
            }),
            Self::BreakStatement(node) => rewrite!(rewriter, break_statement, node => {}),
            Self::ContinueStatement(node) => rewrite!(rewriter, continue_statement, node => {}),
            Self::ThrowStatement(node) => {
                rewrite!(rewriter, throw_statement, node => { node.argument.walk(rewriter); })
            }
            Self::TryStatement(node) => rewrite!(rewriter, try_statement, node => {
                node.block.body.walk(rewriter);
                if let Some(handler) = &mut node.handler {
                    handler.body.body.walk(rewriter);
                }
                if let Some(finalizer) = &mut node.finalizer {
                    finalizer.body.walk(rewriter);
                }
            }),
            Self::EmptyStatement(node) => rewrite!(rewriter, empty_statement, node => {}),
            Self::SwitchStatement(node) => rewrite!(rewriter, switch_statement, node => {
                node.discriminant.walk(rewriter);
                for case in &mut node.cases {
                    case.test.walk(rewriter);
                    case.consequent.walk(rewriter);
                }
            }),
            Self::LabeledStatement(node) => rewrite!(rewriter, labeled_statement, node => {
                node.body.walk(rewriter);
            }),
            // Unsupported syntax is left alone.
            Self::Raw(node) => Self::Raw(node),
        };
    }
}

impl Walk for Expression {
    fn walk(&mut self, rewriter: &mut dyn Rewriter) {
        let id = NodeId::of(self);
        *self = match self.take() {
            Self::Identifier(node) => rewrite!(rewriter, identifier, node, id => {}),
            Self::Literal(node) => rewrite!(rewriter, literal, node, id => {}),
            Self::ThisExpression(node) => rewrite!(rewriter, this_expression, node, id => {}),
            Self::ArrayExpression(node) => rewrite!(rewriter, array_expression, node, id => {
                node.elements.walk(rewriter);
            }),
            Self::ObjectExpression(node) => rewrite!(rewriter, object_expression, node, id => {
                // Keys are names, not references.
                for property in &mut node.properties {
                    property.value.walk(rewriter);
                }
            }),
            Self::FunctionExpression(node) => rewrite!(rewriter, function_expression, node, id => {
                node.walk(rewriter);
            }),
            Self::UnaryExpression(node) => rewrite!(rewriter, unary_expression, node, id => {
                node.argument.walk(rewriter);
            }),
            Self::UpdateExpression(node) => rewrite!(rewriter, update_expression, node, id => {
                node.argument.walk(rewriter);
            }),
            Self::BinaryExpression(node) => rewrite!(rewriter, binary_expression, node, id => {
                node.left.walk(rewriter);
                node.right.walk(rewriter);
            }),
            Self::LogicalExpression(node) => rewrite!(rewriter, logical_expression, node, id => {
                node.left.walk(rewriter);
                node.right.walk(rewriter);
            }),
            Self::AssignmentExpression(node) => {
                rewrite!(rewriter, assignment_expression, node, id => {
                    node.left.walk(rewriter);
                    node.right.walk(rewriter);
                })
            }
            Self::ConditionalExpression(node) => {
                rewrite!(rewriter, conditional_expression, node, id => {
                    node.test.walk(rewriter);
                    node.consequent.walk(rewriter);
                    node.alternate.walk(rewriter);
                })
            }
            Self::CallExpression(node) => rewrite!(rewriter, call_expression, node, id => {
                node.callee.walk(rewriter);
                node.arguments.walk(rewriter);
            }),
            Self::NewExpression(node) => rewrite!(rewriter, new_expression, node, id => {
                node.callee.walk(rewriter);
                node.arguments.walk(rewriter);
            }),
            Self::MemberExpression(node) => rewrite!(rewriter, member_expression, node, id => {
                node.object.walk(rewriter);
                if node.computed {
                    node.property.walk(rewriter);
                }
            }),
            Self::SequenceExpression(node) => {
                rewrite!(rewriter, sequence_expression, node, id => {
                    node.expressions.walk(rewriter);
                })
            }
            Self::Raw(node) => Self::Raw(node),
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Records the order in which hooks fire.
    #[derive(Default)]
    struct Recorder {
        events: Vec<String>,
    }

    impl Rewriter for Recorder {
        fn enter_call_expression(&mut self, _node: &mut CallExpression) {
            self.events.push("enter call".to_string());
        }

        fn leave_call_expression(&mut self, _id: NodeId, node: CallExpression) -> Expression {
            self.events.push("leave call".to_string());
            Expression::CallExpression(node)
        }

        fn leave_identifier(&mut self, _id: NodeId, node: Identifier) -> Expression {
            self.events.push(format!("leave {}", node.name));
            Expression::Identifier(node)
        }

        fn leave_member_expression(&mut self, _id: NodeId, node: MemberExpression) -> Expression {
            self.events.push("leave member".to_string());
            Expression::MemberExpression(node)
        }
    }

    /// Replaces every numeric literal with its double.
    struct Doubler;

    impl Rewriter for Doubler {
        fn leave_literal(&mut self, _id: NodeId, node: Literal) -> Expression {
            match node.value {
                LiteralValue::Number(n) => Expression::number(n * 2.0),
                _ => Expression::Literal(node),
            }
        }
    }

    /// Checks that the identity seen while entering a parent matches the child's own.
    #[derive(Default)]
    struct IdentityCheck {
        marked: Option<NodeId>,
        matched: bool,
    }

    impl Rewriter for IdentityCheck {
        fn enter_assignment_expression(&mut self, node: &mut AssignmentExpression) {
            self.marked = Some(NodeId::of(&node.left));
        }

        fn leave_member_expression(&mut self, id: NodeId, node: MemberExpression) -> Expression {
            self.matched |= self.marked == Some(id);
            Expression::MemberExpression(node)
        }
    }

    fn program(source: &str) -> Program {
        parse(source, &ParseOptions::default()).unwrap()
    }

    #[test]
    fn test_pre_and_post_order() {
        let mut recorder = Recorder::default();
        program("a.b(c);").walk(&mut recorder);
        assert_eq!(
            recorder.events,
            vec!["enter call", "leave a", "leave member", "leave c", "leave call"]
        );
    }

    #[test]
    fn test_leave_substitutes() {
        let mut tree = program("var x = [1, 2 + 3];\nfunction f() { return 4; }");
        tree.walk(&mut Doubler);
        assert_eq!(print(&tree), "var x = [2, 4 + 6];\nfunction f() {\n    return 8;\n}\n");
    }

    #[test]
    fn test_switch_and_labels_are_walked() {
        let mut tree = program("a: switch (1) { case 2: x = 3; break a; default: y = 4; }");
        tree.walk(&mut Doubler);
        assert_eq!(
            print(&tree),
            "a: switch (2) {\n    case 4:\n        x = 6;\n        break a;\n    default:\n        y = 8;\n}\n"
        );
    }

    #[test]
    fn test_node_identity_is_stable() {
        let mut check = IdentityCheck::default();
        program("o.p = f(1);").walk(&mut check);
        assert!(check.matched);
    }
}

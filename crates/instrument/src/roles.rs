//! Role flags that stop the property-read rule from firing on write targets, update targets
//! and method callees.

use esprof_syntax::Expression;
use rustc_hash::FxHashMap;

use crate::visitor::NodeId;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Role {
    /// Left side of an assignment, or operand of `delete`.
    WriteTarget,
    UpdateTarget,
    MethodCallee,
}

/// Side table of flagged property accesses, keyed by node identity.
#[derive(Debug, Default)]
pub struct RoleTable {
    roles: FxHashMap<NodeId, Role>,
}

impl RoleTable {
    /// Flag `node` with `role` if it is a property access. Other nodes never compete with the
    /// read rule and are left alone.
    pub fn mark(&mut self, node: &Expression, role: Role) {
        if matches!(node, Expression::MemberExpression(_)) {
            self.roles.insert(NodeId::of(node), role);
        }
    }

    /// Consume the flag of a node. Each flag is read exactly once.
    pub fn take(&mut self, id: NodeId) -> Option<Role> {
        self.roles.remove(&id)
    }

    pub fn is_empty(&self) -> bool {
        self.roles.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flags_are_consumed_once() {
        let member = Expression::MemberExpression(esprof_syntax::MemberExpression {
            object: Box::new(Expression::identifier("o")),
            property: Box::new(Expression::identifier("p")),
            computed: false,
            loc: None,
        });
        let mut table = RoleTable::default();
        table.mark(&member, Role::MethodCallee);
        assert_eq!(table.take(NodeId::of(&member)), Some(Role::MethodCallee));
        assert_eq!(table.take(NodeId::of(&member)), None);
        assert!(table.is_empty());
    }

    #[test]
    fn test_only_property_accesses_are_flagged() {
        let ident = Expression::identifier("x");
        let mut table = RoleTable::default();
        table.mark(&ident, Role::WriteTarget);
        assert!(table.is_empty());
    }
}

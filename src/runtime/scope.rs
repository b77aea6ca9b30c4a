use std::{cell::RefCell, rc::Rc};

use rustc_hash::FxHashMap;

use crate::{
    ir::scope::{ScopeId, ScopeTree, UnknownVariable},
    lang::value::Value,
};

pub type ScopeRef = Rc<RefCell<RuntimeScope>>;

/// Variable storage of one method or block invocation.
///
/// Created for the declaring (non-hoisting) lexical scope of a body and
/// filled with nil for every variable that scope declares, so hoisted
/// declarations are visible before their first assignment.
#[derive(Debug)]
pub struct RuntimeScope {
    vars: FxHashMap<String, Value>,
    parent: Option<ScopeRef>,
    /// Transparent to outward lookup (block bodies).
    block: bool,
    /// The lexical scope this invocation instantiates.
    pub lexical: ScopeId,
}

impl RuntimeScope {
    pub fn new(scopes: &ScopeTree, lexical: ScopeId, parent: Option<ScopeRef>) -> ScopeRef {
        let vars = scopes
            .get(lexical)
            .vars
            .keys()
            .map(|name| (name.clone(), Value::Nil))
            .collect();
        Rc::new(RefCell::new(RuntimeScope {
            vars,
            parent,
            block: scopes.get(lexical).block,
            lexical,
        }))
    }

    /// Run-time counterpart of `ScopeTree::resolve`: the scope holding
    /// `name` and the number of block boundaries crossed to reach it.
    pub fn resolve(
        scope: &ScopeRef,
        name: &str,
        local_only: bool,
    ) -> Result<(ScopeRef, usize), UnknownVariable> {
        let mut current = Rc::clone(scope);
        let mut depth = 0;
        loop {
            let next = {
                let s = current.borrow();
                if s.vars.contains_key(name) {
                    None
                } else {
                    match &s.parent {
                        Some(parent) if s.block && !local_only => Some(Rc::clone(parent)),
                        _ => {
                            return Err(UnknownVariable {
                                name: name.to_string(),
                                scope: scope.borrow().lexical,
                            });
                        }
                    }
                }
            };
            match next {
                None => return Ok((current, depth)),
                Some(parent) => {
                    current = parent;
                    depth += 1;
                }
            }
        }
    }

    pub fn get(scope: &ScopeRef, name: &str) -> Result<Value, UnknownVariable> {
        let (owner, _) = Self::resolve(scope, name, false)?;
        let value = owner.borrow().vars.get(name).cloned().unwrap_or(Value::Nil);
        Ok(value)
    }

    pub fn set(
        scope: &ScopeRef,
        name: &str,
        value: Value,
        local_only: bool,
    ) -> Result<(), UnknownVariable> {
        let (owner, _) = Self::resolve(scope, name, local_only)?;
        owner.borrow_mut().vars.insert(name.to_string(), value);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::scope::ScopeKind;

    #[test]
    fn test_prepopulated_with_nil() {
        let mut tree = ScopeTree::new();
        tree.declare(ScopeId::ROOT, "x");
        let root = RuntimeScope::new(&tree, ScopeId::ROOT, None);
        assert_eq!(RuntimeScope::get(&root, "x").unwrap(), Value::Nil);
    }

    #[test]
    fn test_block_writes_through_to_method() {
        let mut tree = ScopeTree::new();
        let block = tree.push(ScopeId::ROOT, ScopeKind::Block);
        tree.declare(ScopeId::ROOT, "total");
        tree.declare(block, "item");

        let root = RuntimeScope::new(&tree, ScopeId::ROOT, None);
        let inner = RuntimeScope::new(&tree, block, Some(Rc::clone(&root)));
        RuntimeScope::set(&inner, "total", Value::Integer(3), false).unwrap();

        assert_eq!(RuntimeScope::get(&root, "total").unwrap(), Value::Integer(3));
        let (owner, depth) = RuntimeScope::resolve(&inner, "total", false).unwrap();
        assert_eq!(owner.borrow().lexical, ScopeId::ROOT);
        assert_eq!(depth, 1);
    }

    #[test]
    fn test_local_only_does_not_escape_block() {
        let mut tree = ScopeTree::new();
        let block = tree.push(ScopeId::ROOT, ScopeKind::Block);
        tree.declare(ScopeId::ROOT, "x");
        let root = RuntimeScope::new(&tree, ScopeId::ROOT, None);
        let inner = RuntimeScope::new(&tree, block, Some(root));
        let err = RuntimeScope::set(&inner, "x", Value::Nil, true).unwrap_err();
        assert_eq!(err.scope, block);
    }

    #[test]
    fn test_method_scope_has_no_parent_lookup() {
        let mut tree = ScopeTree::new();
        let method = tree.push(ScopeId::ROOT, ScopeKind::Method);
        tree.declare(ScopeId::ROOT, "top");
        let frame = RuntimeScope::new(&tree, method, None);
        assert!(RuntimeScope::get(&frame, "top").is_err());
    }
}

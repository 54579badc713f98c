//! Traversal contract for analyses and rewrites.
//!
//! A [`Visitor`] decides what happens at each node through the
//! [`VisitAction`] it returns from `enter`. The default for every category is
//! [`VisitAction::Continue`], which recurses into children. Structural edits
//! are applied to the parent's slot after the node's siblings have been
//! visited; replacement and inserted nodes are not visited in the same pass.

use glint_core::GlintResult;

use crate::ast::{Ast, NodeCategory, NodeId, ProgramUnit, SlotMut};

/// What to do with the node being visited.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VisitAction {
    /// Keep the node and visit its children.
    Continue,
    /// Keep the node, do not visit its children.
    SkipChildren,
    /// Put another node in this node's place.
    Replace(NodeId),
    /// Drop the node from its parent.
    Remove,
    /// Keep the node (and visit its children) with siblings before it.
    InsertBefore(Vec<NodeId>),
    /// Keep the node (and visit its children) with siblings after it.
    InsertAfter(Vec<NodeId>),
}

pub trait Visitor {
    fn visit_declaration(&mut self, _ast: &mut Ast, _id: NodeId) -> GlintResult<VisitAction> {
        Ok(VisitAction::Continue)
    }

    fn visit_function(&mut self, _ast: &mut Ast, _id: NodeId) -> GlintResult<VisitAction> {
        Ok(VisitAction::Continue)
    }

    fn visit_statement(&mut self, _ast: &mut Ast, _id: NodeId) -> GlintResult<VisitAction> {
        Ok(VisitAction::Continue)
    }

    fn visit_expression(&mut self, _ast: &mut Ast, _id: NodeId) -> GlintResult<VisitAction> {
        Ok(VisitAction::Continue)
    }

    fn visit_primary(&mut self, _ast: &mut Ast, _id: NodeId) -> GlintResult<VisitAction> {
        Ok(VisitAction::Continue)
    }

    /// Dispatch on the node's category.
    fn enter(&mut self, ast: &mut Ast, id: NodeId) -> GlintResult<VisitAction> {
        match ast.kind(id).category() {
            NodeCategory::TranslationUnit => Ok(VisitAction::Continue),
            NodeCategory::Declaration => self.visit_declaration(ast, id),
            NodeCategory::FunctionDefinition => self.visit_function(ast, id),
            NodeCategory::Statement => self.visit_statement(ast, id),
            NodeCategory::Expression => self.visit_expression(ast, id),
            NodeCategory::Primary => self.visit_primary(ast, id),
        }
    }

    /// Called after a kept node's children have been visited.
    fn leave(&mut self, _ast: &mut Ast, _id: NodeId) -> GlintResult<()> {
        Ok(())
    }
}

/// Run `visitor` over the whole program.
pub fn walk_unit(unit: &mut ProgramUnit, visitor: &mut dyn Visitor) -> GlintResult<()> {
    walk(&mut unit.ast, unit.root, visitor)
}

/// Run `visitor` over the tree below `root`. The root itself can only be
/// kept.
pub fn walk(ast: &mut Ast, root: NodeId, visitor: &mut dyn Visitor) -> GlintResult<()> {
    match visit_node(ast, root, visitor)? {
        VisitAction::Continue => Ok(()),
        _ => Err(ast.transform_error(root, "the root of a walk cannot be replaced, removed or given siblings")),
    }
}

/// Visit one node; returns the structural edit its parent must apply.
fn visit_node(ast: &mut Ast, id: NodeId, visitor: &mut dyn Visitor) -> GlintResult<VisitAction> {
    let action = visitor.enter(ast, id)?;
    match action {
        VisitAction::Replace(_) | VisitAction::Remove => return Ok(action),
        VisitAction::SkipChildren => {}
        VisitAction::Continue | VisitAction::InsertBefore(_) | VisitAction::InsertAfter(_) => {
            walk_children(ast, id, visitor)?
        }
    }
    visitor.leave(ast, id)?;
    Ok(match action {
        VisitAction::SkipChildren => VisitAction::Continue,
        other => other,
    })
}

fn slot_count(ast: &mut Ast, parent: NodeId) -> usize {
    ast.kind_mut(parent).slots_mut().len()
}

fn slot_ids(ast: &mut Ast, parent: NodeId, index: usize) -> Vec<NodeId> {
    match ast.kind_mut(parent).slots_mut().into_iter().nth(index) {
        Some(SlotMut::Required(id)) => vec![*id],
        Some(SlotMut::Optional(id)) => id.iter().copied().collect(),
        Some(SlotMut::List(ids)) => ids.clone(),
        None => Vec::new(),
    }
}

fn walk_children(ast: &mut Ast, parent: NodeId, visitor: &mut dyn Visitor) -> GlintResult<()> {
    let mut index = 0;
    while index < slot_count(ast, parent) {
        let children = slot_ids(ast, parent, index);
        let mut edits = Vec::new();
        for (position, child) in children.iter().enumerate() {
            let action = visit_node(ast, *child, visitor)?;
            if action != VisitAction::Continue {
                edits.push((position, *child, action));
            }
        }
        if !edits.is_empty() {
            apply_edits(ast, parent, index, edits)?;
        }
        index += 1;
    }
    Ok(())
}

fn apply_edits(
    ast: &mut Ast,
    parent: NodeId,
    index: usize,
    edits: Vec<(usize, NodeId, VisitAction)>,
) -> GlintResult<()> {
    let refused: Option<(NodeId, &'static str)> = {
        let slot = ast.kind_mut(parent).slots_mut().into_iter().nth(index);
        match slot {
            Some(SlotMut::Required(id)) => edits.into_iter().find_map(|(_, child, action)| match action {
                VisitAction::Replace(new) => {
                    *id = new;
                    None
                }
                VisitAction::Remove => Some((child, "cannot remove a node its parent requires")),
                _ => Some((child, "cannot insert siblings next to a single-node slot")),
            }),
            Some(SlotMut::Optional(id)) => edits.into_iter().find_map(|(_, child, action)| match action {
                VisitAction::Replace(new) => {
                    *id = Some(new);
                    None
                }
                VisitAction::Remove => {
                    *id = None;
                    None
                }
                _ => Some((child, "cannot insert siblings next to a single-node slot")),
            }),
            Some(SlotMut::List(ids)) => {
                let mut edits = edits.into_iter().peekable();
                let mut rebuilt = Vec::with_capacity(ids.len());
                for (position, id) in ids.iter().enumerate() {
                    match edits.next_if(|(at, _, _)| *at == position) {
                        None => rebuilt.push(*id),
                        Some((_, _, VisitAction::Replace(new))) => rebuilt.push(new),
                        Some((_, _, VisitAction::Remove)) => {}
                        Some((_, _, VisitAction::InsertBefore(nodes))) => {
                            rebuilt.extend(nodes);
                            rebuilt.push(*id);
                        }
                        Some((_, _, VisitAction::InsertAfter(nodes))) => {
                            rebuilt.push(*id);
                            rebuilt.extend(nodes);
                        }
                        Some((_, _, _)) => rebuilt.push(*id),
                    }
                }
                *ids = rebuilt;
                None
            }
            None => None,
        }
    };
    match refused {
        Some((child, message)) => Err(ast.transform_error(child, message)),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{Literal, LiteralKind, NodeKind};
    use crate::lexer::{Lexer, Span};
    use crate::parser::parse_program;
    use glint_core::GlintError;

    fn unit(src: &str) -> ProgramUnit {
        let mut lexer = Lexer::new(src);
        let tokens = lexer.tokenize().unwrap();
        let outcome = parse_program(tokens, lexer.file_names(), true);
        assert!(outcome.errors.is_empty(), "{:?}", outcome.errors);
        outcome.unit
    }

    struct CountPrimaries(usize);

    impl Visitor for CountPrimaries {
        fn visit_primary(&mut self, _ast: &mut Ast, _id: NodeId) -> GlintResult<VisitAction> {
            self.0 += 1;
            Ok(VisitAction::Continue)
        }
    }

    #[test]
    fn test_default_visitor_reaches_every_primary() {
        let mut unit = unit("float a[2] = float[](1.0, b);\nvoid main() { x = y + 2; }");
        let mut counter = CountPrimaries(0);
        walk_unit(&mut unit, &mut counter).unwrap();
        // 2, 1.0, b, x, y, 2
        assert_eq!(counter.0, 6);
    }

    struct ZeroIdentifiers;

    impl Visitor for ZeroIdentifiers {
        fn visit_primary(&mut self, ast: &mut Ast, id: NodeId) -> GlintResult<VisitAction> {
            if matches!(ast.kind(id), NodeKind::Identifier(_)) {
                let zero = ast.alloc(
                    NodeKind::Literal(Literal {
                        kind: LiteralKind::Int,
                        text: "0".into(),
                    }),
                    Span::default(),
                );
                return Ok(VisitAction::Replace(zero));
            }
            Ok(VisitAction::Continue)
        }
    }

    #[test]
    fn test_replace_in_required_slot() {
        let mut unit = unit("void main() { return a + 1; }");
        walk_unit(&mut unit, &mut ZeroIdentifiers).unwrap();
        assert!(unit.dump().contains("(return (+ 0 1))"));
        unit.check_well_formed().unwrap();
    }

    struct DropBreaks {
        statements_seen: usize,
    }

    impl Visitor for DropBreaks {
        fn visit_statement(&mut self, ast: &mut Ast, id: NodeId) -> GlintResult<VisitAction> {
            self.statements_seen += 1;
            match ast.kind(id) {
                NodeKind::Jump(crate::ast::JumpKind::Break) => Ok(VisitAction::Remove),
                NodeKind::Return { .. } => {
                    let marker = ast.alloc(NodeKind::ExpressionStatement { expression: None }, Span::default());
                    Ok(VisitAction::InsertBefore(vec![marker]))
                }
                _ => Ok(VisitAction::Continue),
            }
        }
    }

    #[test]
    fn test_remove_and_insert_in_lists() {
        let mut unit = unit("void main() { x = 1; break; return; }");
        let mut visitor = DropBreaks { statements_seen: 0 };
        walk_unit(&mut unit, &mut visitor).unwrap();
        assert_eq!(
            unit.dump(),
            "(unit (function (type void) main (params) (block (expr (= x 1)) (expr) (return))))"
        );
        // body, three statements; the inserted marker is not visited
        assert_eq!(visitor.statements_seen, 4);
    }

    struct RemoveConditions;

    impl Visitor for RemoveConditions {
        fn visit_expression(&mut self, ast: &mut Ast, id: NodeId) -> GlintResult<VisitAction> {
            if matches!(ast.kind(id), NodeKind::Binary { .. }) {
                return Ok(VisitAction::Remove);
            }
            Ok(VisitAction::Continue)
        }
    }

    #[test]
    fn test_removing_required_child_fails() {
        let mut unit = unit("void main() { if (a < b) return; }");
        let err = walk_unit(&mut unit, &mut RemoveConditions).unwrap_err();
        assert!(matches!(err, GlintError::Transform { .. }));
    }
}

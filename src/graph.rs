//! Message dependency ordering.

use std::collections::HashMap;

use log::debug;
use petgraph::algo::toposort;
use petgraph::graph::{Graph, NodeIndex};

use crate::schema::{Def, FieldType, Schema};

/// `MessageGraph` builds a graph of messages whose edges correspond to
/// field-type references, to order definitions definee-before-referrer and
/// to recognize reference cycles.
pub struct MessageGraph {
    index: HashMap<String, NodeIndex>,
    graph: Graph<String, ()>,
}

impl MessageGraph {
    pub fn new(schema: &Schema) -> MessageGraph {
        let mut msg_graph = MessageGraph {
            index: HashMap::new(),
            graph: Graph::new(),
        };
        for msg in schema.messages() {
            msg_graph.get_or_insert_index(msg.name.clone());
        }
        for msg in schema.messages() {
            let from = msg_graph.get_or_insert_index(msg.name.clone());
            for field in &msg.fields {
                if let FieldType::Message(target) = &field.ty {
                    let to = msg_graph.get_or_insert_index(target.clone());
                    msg_graph.graph.add_edge(from, to, ());
                }
            }
        }
        msg_graph
    }

    fn get_or_insert_index(&mut self, msg_name: String) -> NodeIndex {
        let MessageGraph {
            ref mut index,
            ref mut graph,
        } = *self;
        *index
            .entry(msg_name.clone())
            .or_insert_with(|| graph.add_node(msg_name))
    }

    /// Message names with every message's dependencies listed before it,
    /// or `None` when the graph has a cycle.
    pub fn dependency_order(&self) -> Option<Vec<String>> {
        let order = toposort(&self.graph, None).ok()?;
        Some(
            order
                .into_iter()
                .rev()
                .map(|ix| self.graph[ix].clone())
                .collect(),
        )
    }
}

/// Reorders message definitions into dependency order (leaves first).
/// Enum definitions keep their original slots. On a cycle the original
/// order is kept and the second return value is `true`.
pub fn sort_defs(schema: Schema) -> (Schema, bool) {
    let graph = MessageGraph::new(&schema);
    let Some(order) = graph.dependency_order() else {
        debug!("message graph is cyclic; keeping declaration order");
        return (schema, true);
    };

    let position: HashMap<&str, usize> = order
        .iter()
        .enumerate()
        .map(|(idx, name)| (name.as_str(), idx))
        .collect();

    let mut messages = Vec::new();
    let mut slots = Vec::with_capacity(schema.defs.len());
    for def in schema.defs {
        match def {
            Def::Message(m) => {
                messages.push(m);
                slots.push(None);
            }
            Def::Enum(e) => slots.push(Some(Def::Enum(e))),
        }
    }
    messages.sort_by_key(|m| position.get(m.name.as_str()).copied().unwrap_or(usize::MAX));

    let mut sorted = messages.into_iter();
    let defs = slots
        .into_iter()
        .map(|slot| match slot {
            Some(def) => def,
            None => Def::Message(sorted.next().expect("message slot count matches")),
        })
        .collect();
    (Schema { defs }, false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::normalize::normalize;
    use crate::parse::parse_proto;

    fn schema(src: &str) -> Schema {
        let file = parse_proto(src).unwrap();
        normalize(std::slice::from_ref(&file)).unwrap()
    }

    fn message_order(schema: &Schema) -> Vec<&str> {
        schema.messages().map(|m| m.name.as_str()).collect()
    }

    #[test]
    fn orders_dependencies_before_dependants() {
        let (sorted, cyclic) = sort_defs(schema(
            "message A { required B b = 1; required C c = 2; }
             message B { required C c = 1; }
             message C { required int32 x = 1; }",
        ));
        assert!(!cyclic);
        assert_eq!(message_order(&sorted), ["C", "B", "A"]);
    }

    #[test]
    fn keeps_enum_slots_in_place() {
        let (sorted, cyclic) = sort_defs(schema(
            "message A { required B b = 1; }
             enum E { X = 0; }
             message B { optional E e = 1; }",
        ));
        assert!(!cyclic);
        let names: Vec<&str> = sorted.defs.iter().map(Def::name).collect();
        assert_eq!(names, ["B", "E", "A"]);
    }

    #[test]
    fn reports_cycles_and_keeps_declaration_order() {
        let (sorted, cyclic) = sort_defs(schema(
            "message Ping { optional Pong pong = 1; }
             message Pong { optional Ping ping = 1; }",
        ));
        assert!(cyclic);
        assert_eq!(message_order(&sorted), ["Ping", "Pong"]);
    }

    #[test]
    fn self_reference_is_a_cycle() {
        let (_, cyclic) = sort_defs(schema("message Node { repeated Node child = 1; }"));
        assert!(cyclic);
    }
}

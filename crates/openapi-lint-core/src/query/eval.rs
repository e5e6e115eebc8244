//! Query evaluation over a raw tree or a resolved view.

use super::parser::{Accessor, CompareOp, Expr, Selector, Step};
use super::QueryMatch;
use crate::json::{JsonPath, PathSegment};
use crate::view::Node;

use serde_json::Value;
use std::borrow::Cow;
use std::cmp::Ordering;
use std::collections::HashSet;

pub(crate) fn evaluate<'a>(steps: &[Step], root: &Node<'a>) -> Vec<QueryMatch<'a>> {
    let mut nodes = vec![QueryMatch {
        path: JsonPath::root(),
        node: root.clone(),
    }];

    for step in steps {
        nodes = match step {
            Step::Child(selectors) => {
                let mut out = Vec::new();
                for node in &nodes {
                    select(node, selectors, &mut out);
                }
                out
            }
            Step::Descendant(selectors) => {
                let mut out = Vec::new();
                for node in &nodes {
                    descend(&node.path, &node.node, selectors, &mut out);
                }
                out
            }
            Step::Parent => parents(root, &nodes),
        };
        if nodes.is_empty() {
            break;
        }
    }
    nodes
}

fn descend<'a>(path: &JsonPath, node: &Node<'a>, selectors: &[Selector], out: &mut Vec<QueryMatch<'a>>) {
    let here = QueryMatch {
        path: path.clone(),
        node: node.clone(),
    };
    select(&here, selectors, out);
    for (segment, child) in node.children() {
        descend(&path.child(segment), &child, selectors, out);
    }
}

fn parents<'a>(root: &Node<'a>, nodes: &[QueryMatch<'a>]) -> Vec<QueryMatch<'a>> {
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for node in nodes {
        let Some(parent) = node.path.parent() else {
            continue;
        };
        if !seen.insert(parent.clone()) {
            continue;
        }
        if let Some(found) = root.at(&parent) {
            out.push(QueryMatch {
                path: parent,
                node: found,
            });
        }
    }
    out
}

fn select<'a>(node: &QueryMatch<'a>, selectors: &[Selector], out: &mut Vec<QueryMatch<'a>>) {
    for selector in selectors {
        match selector {
            Selector::Name(name) => {
                if let Some(child) = node.node.get(name) {
                    out.push(QueryMatch {
                        path: node.path.child(name.as_str()),
                        node: child,
                    });
                }
            }
            Selector::Index(index) => {
                let found = node
                    .node
                    .value()
                    .as_array()
                    .and_then(|items| element(items, *index))
                    .and_then(|(i, _)| Some((i, node.node.index(i)?)));
                if let Some((i, child)) = found {
                    out.push(QueryMatch {
                        path: node.path.child(i),
                        node: child,
                    });
                }
            }
            Selector::Wildcard => {
                for (segment, child) in node.node.children() {
                    out.push(QueryMatch {
                        path: node.path.child(segment),
                        node: child,
                    });
                }
            }
            Selector::Filter(expr) => {
                for (segment, child) in node.node.children() {
                    if truthy(eval(expr, &child, &segment).as_deref()) {
                        out.push(QueryMatch {
                            path: node.path.child(segment),
                            node: child,
                        });
                    }
                }
            }
        }
    }
}

fn element(items: &[Value], index: i64) -> Option<(usize, &Value)> {
    let i = if index < 0 {
        items.len().checked_sub(usize::try_from(index.unsigned_abs()).ok()?)?
    } else {
        usize::try_from(index).ok()?
    };
    items.get(i).map(|v| (i, v))
}

/// Evaluates a filter expression; `None` stands for JavaScript's `undefined`.
fn eval<'a>(expr: &'a Expr, current: &Node<'a>, property: &PathSegment) -> Option<Cow<'a, Value>> {
    match expr {
        Expr::Current(accessors) => access(current, accessors),
        Expr::Property => Some(Cow::Owned(match property {
            PathSegment::Key(key) => Value::String(key.clone()),
            PathSegment::Index(index) => Value::from(*index),
        })),
        Expr::Literal(value) => value.as_ref().map(Cow::Borrowed),
        Expr::Not(inner) => Some(Cow::Owned(Value::Bool(!truthy(eval(inner, current, property).as_deref())))),
        Expr::And(left, right) => {
            let left = eval(left, current, property);
            if truthy(left.as_deref()) {
                eval(right, current, property)
            } else {
                left
            }
        }
        Expr::Or(left, right) => {
            let left = eval(left, current, property);
            if truthy(left.as_deref()) {
                left
            } else {
                eval(right, current, property)
            }
        }
        Expr::Compare(op, left, right) => {
            let left = eval(left, current, property);
            let right = eval(right, current, property);
            Some(Cow::Owned(Value::Bool(compare(*op, left.as_deref(), right.as_deref()))))
        }
    }
}

/// Member access from `@`; in a resolved view references are followed.
fn access<'a>(current: &Node<'a>, accessors: &[Accessor]) -> Option<Cow<'a, Value>> {
    let mut node = current.clone();
    for (i, accessor) in accessors.iter().enumerate() {
        let last = i + 1 == accessors.len();
        node = match (accessor, node.value()) {
            (Accessor::Key(key), Value::Object(_)) => node.get(key)?,
            (Accessor::Key(key), Value::Array(items)) if key == "length" && last => {
                return Some(Cow::Owned(Value::from(items.len())));
            }
            (Accessor::Key(key), Value::String(s)) if key == "length" && last => {
                return Some(Cow::Owned(Value::from(s.chars().count())));
            }
            (Accessor::Index(index), Value::Array(items)) => node.index(element(items, *index)?.0)?,
            (Accessor::Index(index), Value::Object(_)) => node.get(&index.to_string())?,
            _ => return None,
        };
    }
    Some(Cow::Borrowed(node.value()))
}

/// JavaScript truthiness.
fn truthy(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => false,
        Some(Value::Bool(b)) => *b,
        Some(Value::Number(n)) => n.as_f64().is_some_and(|f| f != 0.0 && !f.is_nan()),
        Some(Value::String(s)) => !s.is_empty(),
        Some(Value::Array(_) | Value::Object(_)) => true,
    }
}

fn compare(op: CompareOp, left: Option<&Value>, right: Option<&Value>) -> bool {
    match op {
        CompareOp::StrictEq => strict_eq(left, right),
        CompareOp::StrictNe => !strict_eq(left, right),
        CompareOp::LooseEq => loose_eq(left, right),
        CompareOp::LooseNe => !loose_eq(left, right),
        CompareOp::Lt => order(left, right) == Some(Ordering::Less),
        CompareOp::Le => matches!(order(left, right), Some(Ordering::Less | Ordering::Equal)),
        CompareOp::Gt => order(left, right) == Some(Ordering::Greater),
        CompareOp::Ge => matches!(order(left, right), Some(Ordering::Greater | Ordering::Equal)),
    }
}

fn strict_eq(left: Option<&Value>, right: Option<&Value>) -> bool {
    match (left, right) {
        (None, None) => true,
        (Some(Value::Number(a)), Some(Value::Number(b))) => a.as_f64() == b.as_f64(),
        // Objects and arrays compare by identity in JavaScript; values from
        // different places never are identical.
        (Some(Value::Object(_) | Value::Array(_)), _) | (_, Some(Value::Object(_) | Value::Array(_))) => false,
        (Some(a), Some(b)) => a == b,
        _ => false,
    }
}

fn loose_eq(left: Option<&Value>, right: Option<&Value>) -> bool {
    match (left, right) {
        (None | Some(Value::Null), None | Some(Value::Null)) => true,
        (None | Some(Value::Null), _) | (_, None | Some(Value::Null)) => false,
        (Some(a @ (Value::Number(_) | Value::String(_) | Value::Bool(_))), Some(b @ (Value::Number(_) | Value::String(_) | Value::Bool(_))))
            if std::mem::discriminant(a) != std::mem::discriminant(b) =>
        {
            match (to_number(a), to_number(b)) {
                (Some(x), Some(y)) => x == y,
                _ => false,
            }
        }
        _ => strict_eq(left, right),
    }
}

fn order(left: Option<&Value>, right: Option<&Value>) -> Option<Ordering> {
    match (left?, right?) {
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        (a, b) => to_number(a)?.partial_cmp(&to_number(b)?),
    }
}

fn to_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        Value::Null => Some(0.0),
        Value::String(s) if s.trim().is_empty() => Some(0.0),
        Value::String(s) => s.trim().parse().ok(),
        Value::Array(_) | Value::Object(_) => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn truthiness_follows_javascript() {
        assert!(!truthy(None));
        assert!(!truthy(Some(&json!(null))));
        assert!(!truthy(Some(&json!(0))));
        assert!(!truthy(Some(&json!(""))));
        assert!(truthy(Some(&json!("0"))));
        assert!(truthy(Some(&json!([]))));
        assert!(truthy(Some(&json!({}))));
    }

    #[test]
    fn equality_flavours() {
        assert!(strict_eq(Some(&json!(1)), Some(&json!(1.0))));
        assert!(!strict_eq(Some(&json!(1)), Some(&json!("1"))));
        assert!(loose_eq(Some(&json!(1)), Some(&json!("1"))));
        assert!(loose_eq(None, Some(&json!(null))));
        assert!(!strict_eq(None, Some(&json!(null))));
        assert!(!loose_eq(Some(&json!(0)), None));
    }

    #[test]
    fn ordering_needs_comparable_operands() {
        assert_eq!(order(Some(&json!(2)), Some(&json!("10"))), Some(Ordering::Less));
        assert_eq!(order(Some(&json!("b")), Some(&json!("a"))), Some(Ordering::Greater));
        assert_eq!(order(Some(&json!({})), Some(&json!(1))), None);
        assert_eq!(order(None, Some(&json!(1))), None);
    }

    #[test]
    fn negative_indexes_count_from_the_end() {
        let items = vec![json!(1), json!(2), json!(3)];
        assert_eq!(element(&items, -1).map(|(i, _)| i), Some(2));
        assert_eq!(element(&items, -4), None);
        assert_eq!(element(&items, 3), None);
    }
}

use std::cmp::Ordering;

use serde_json::Value;

use super::{
    CompareOp, FilterExpr, Operand, PathStep, RelativePath, Segment, Selector, Slice, UnionMember,
};
use crate::error::QueryError;

/// Nesting limit for descendant traversal.
const MAX_DEPTH: usize = 256;

pub(super) fn evaluate<'v>(
    segments: &[Segment],
    root: &'v Value,
) -> Result<Vec<&'v Value>, QueryError> {
    let mut nodes = vec![root];
    for segment in segments {
        let mut next = Vec::new();
        for node in nodes {
            match segment {
                Segment::Child(selector) => select(selector, node, root, &mut next),
                Segment::Descendant(selector) => {
                    let mut visited = Vec::new();
                    collect_descendants(node, 0, &mut visited)?;
                    for descendant in visited {
                        select(selector, descendant, root, &mut next);
                    }
                }
            }
        }
        nodes = next;
    }
    Ok(nodes)
}

/// Pre-order walk of `node` and everything below it.
fn collect_descendants<'v>(
    node: &'v Value,
    depth: usize,
    out: &mut Vec<&'v Value>,
) -> Result<(), QueryError> {
    if depth > MAX_DEPTH {
        return Err(QueryError::Internal {
            message: format!("document nesting exceeds {MAX_DEPTH} levels"),
        });
    }
    out.push(node);
    match node {
        Value::Array(items) => {
            for item in items {
                collect_descendants(item, depth + 1, out)?;
            }
        }
        Value::Object(map) => {
            for value in map.values() {
                collect_descendants(value, depth + 1, out)?;
            }
        }
        _ => {}
    }
    Ok(())
}

fn children(node: &Value) -> Box<dyn Iterator<Item = &Value> + '_> {
    match node {
        Value::Array(items) => Box::new(items.iter()),
        Value::Object(map) => Box::new(map.values()),
        _ => Box::new(std::iter::empty()),
    }
}

fn select<'v>(selector: &Selector, node: &'v Value, root: &'v Value, out: &mut Vec<&'v Value>) {
    match selector {
        Selector::Name(name) | Selector::QuotedName(name) => out.extend(member(node, name)),
        Selector::Wildcard => out.extend(children(node)),
        Selector::Index(index) => out.extend(element(node, *index)),
        Selector::Slice(slice) => {
            if let Value::Array(items) = node {
                out.extend(slice_indices(items.len(), slice).map(|i| &items[i]));
            }
        }
        Selector::Union(members) => {
            for m in members {
                match m {
                    UnionMember::Name(name) => out.extend(member(node, name)),
                    UnionMember::Index(index) => out.extend(element(node, *index)),
                }
            }
        }
        Selector::Filter(expr) => {
            out.extend(children(node).filter(|child| test(expr, child, root)));
        }
    }
}

fn member<'v>(node: &'v Value, name: &str) -> Option<&'v Value> {
    node.as_object()?.get(name)
}

fn element(node: &Value, index: i64) -> Option<&Value> {
    let items = node.as_array()?;
    let len = i64::try_from(items.len()).ok()?;
    let normalized = if index < 0 { len + index } else { index };
    usize::try_from(normalized).ok().and_then(|i| items.get(i))
}

/// Indices selected by `slice` on an array of `len` elements, in
/// selection order.
fn slice_indices(len: usize, slice: &Slice) -> impl Iterator<Item = usize> {
    let step = slice.step.unwrap_or(1);
    let len = i64::try_from(len).unwrap_or(i64::MAX);
    let normalize = move |i: i64| if i >= 0 { i } else { len + i };

    let mut indices = Vec::new();
    if step > 0 {
        let lower = slice.start.map_or(0, normalize).clamp(0, len);
        let upper = slice.end.map_or(len, normalize).clamp(0, len);
        let mut i = lower;
        while i < upper {
            indices.push(i);
            let Some(next) = i.checked_add(step) else {
                break;
            };
            i = next;
        }
    } else if step < 0 {
        let upper = slice.start.map_or(len - 1, normalize).clamp(-1, len - 1);
        let lower = slice.end.map_or(-1, normalize).clamp(-1, len - 1);
        let mut i = upper;
        while lower < i {
            indices.push(i);
            let Some(next) = i.checked_add(step) else {
                break;
            };
            i = next;
        }
    }
    indices.into_iter().filter_map(|i| usize::try_from(i).ok())
}

fn test(expr: &FilterExpr, current: &Value, root: &Value) -> bool {
    match expr {
        FilterExpr::Or(left, right) => test(left, current, root) || test(right, current, root),
        FilterExpr::And(left, right) => test(left, current, root) && test(right, current, root),
        FilterExpr::Not(inner) => !test(inner, current, root),
        FilterExpr::Exists(path) => resolve(path, current, root).is_some(),
        FilterExpr::Compare { left, op, right } => compare(
            operand(left, current, root),
            *op,
            operand(right, current, root),
        ),
    }
}

fn resolve<'a>(path: &RelativePath, current: &'a Value, root: &'a Value) -> Option<&'a Value> {
    let start = if path.from_root { root } else { current };
    path.steps.iter().try_fold(start, |node, step| match step {
        PathStep::Name(name) => member(node, name),
        PathStep::Index(index) => element(node, *index),
    })
}

fn operand<'a>(operand: &'a Operand, current: &'a Value, root: &'a Value) -> Option<&'a Value> {
    match operand {
        Operand::Path(path) => resolve(path, current, root),
        Operand::Literal(value) => Some(value),
    }
}

/// Missing operands compare equal only to each other; ordering is defined
/// for number/number and string/string pairs.
fn compare(left: Option<&Value>, op: CompareOp, right: Option<&Value>) -> bool {
    let equal = || match (left, right) {
        (None, None) => true,
        (Some(a), Some(b)) => values_equal(a, b),
        _ => false,
    };
    let ordering = || match (left?, right?) {
        (Value::Number(a), Value::Number(b)) => a.as_f64()?.partial_cmp(&b.as_f64()?),
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        _ => None,
    };

    match op {
        CompareOp::Eq => equal(),
        CompareOp::Ne => !equal(),
        CompareOp::Lt => ordering() == Some(Ordering::Less),
        CompareOp::Gt => ordering() == Some(Ordering::Greater),
        CompareOp::Le => matches!(ordering(), Some(Ordering::Less | Ordering::Equal)),
        CompareOp::Ge => matches!(ordering(), Some(Ordering::Greater | Ordering::Equal)),
    }
}

fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64() == y.as_f64(),
        (Value::Array(x), Value::Array(y)) => {
            x.len() == y.len() && x.iter().zip(y).all(|(a, b)| values_equal(a, b))
        }
        (Value::Object(x), Value::Object(y)) => {
            x.len() == y.len()
                && x
                    .iter()
                    .all(|(k, v)| y.get(k).is_some_and(|w| values_equal(v, w)))
        }
        _ => a == b,
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use crate::jsonpath::JsonPath;

    fn query(doc: &serde_json::Value, path: &str) -> Vec<serde_json::Value> {
        JsonPath::parse(path)
            .unwrap()
            .evaluate(doc)
            .unwrap()
            .into_iter()
            .cloned()
            .collect()
    }

    fn store() -> serde_json::Value {
        json!({
            "store": {
                "name": "Main",
                "id": "s-1",
                "book": [
                    {"title": "A", "price": 8, "tag": "x"},
                    {"title": "B", "price": 12},
                    {"title": "C", "price": 9.5, "tag": "y"}
                ]
            }
        })
    }

    #[test]
    fn test_member_index_and_union() {
        let doc = store();
        assert_eq!(query(&doc, "$.store.name"), vec![json!("Main")]);
        assert_eq!(query(&doc, "$.store.book[-1].title"), vec![json!("C")]);
        assert_eq!(
            query(&doc, "$.store['name','id']"),
            vec![json!("Main"), json!("s-1")]
        );
        assert!(query(&doc, "$.store.missing").is_empty());
        assert!(query(&doc, "$.store.book[7]").is_empty());
    }

    #[test]
    fn test_slices() {
        let doc = json!({"a": [0, 1, 2, 3, 4]});
        assert_eq!(query(&doc, "$.a[1:3]"), vec![json!(1), json!(2)]);
        assert_eq!(query(&doc, "$.a[::2]"), vec![json!(0), json!(2), json!(4)]);
        assert_eq!(
            query(&doc, "$.a[::-1]"),
            vec![json!(4), json!(3), json!(2), json!(1), json!(0)]
        );
        assert_eq!(query(&doc, "$.a[-2:]"), vec![json!(3), json!(4)]);
        assert!(query(&doc, "$.a[::0]").is_empty());
        // Steps near the integer limits select one element and stop.
        assert_eq!(query(&doc, "$.a[1:4:9223372036854775807]"), vec![json!(1)]);
        assert_eq!(
            query(&doc, "$.a[3:0:-9223372036854775808]"),
            vec![json!(3)]
        );
    }

    #[test]
    fn test_filters() {
        let doc = store();
        let titles = |path: &str| {
            query(&doc, path)
                .into_iter()
                .map(|b| b["title"].clone())
                .collect::<Vec<_>>()
        };
        assert_eq!(
            titles("$.store.book[?(@.price < 10)]"),
            vec![json!("A"), json!("C")]
        );
        assert_eq!(
            titles("$.store.book[?(@.tag && @.price > 9)]"),
            vec![json!("C")]
        );
        assert_eq!(titles("$.store.book[?(!@.tag)]"), vec![json!("B")]);
        assert_eq!(
            titles("$.store.book[?(@.title == 'B' || @.price == 8.0)]"),
            vec![json!("A"), json!("B")]
        );
        assert_eq!(
            titles("$.store.book[?(@.owner == $.store.name)]"),
            Vec::<serde_json::Value>::new()
        );
    }

    #[test]
    fn test_descendants() {
        let doc = store();
        assert_eq!(
            query(&doc, "$..title"),
            vec![json!("A"), json!("B"), json!("C")]
        );
        assert_eq!(query(&doc, "$..tag"), vec![json!("x"), json!("y")]);
    }

    #[test]
    fn test_descendant_depth_limit() {
        let mut doc = json!(1);
        for _ in 0..300 {
            doc = json!([doc]);
        }
        let err = JsonPath::parse("$..*").unwrap().evaluate(&doc).unwrap_err();
        assert!(!err.is_invalid_query());
    }
}

use bson::{Bson, Document};
use std::cmp::Ordering;

use crate::errors::DbError;

// Safety limits to prevent resource abuse
const MAX_PATH_DEPTH: usize = 32;
const MAX_IN_SET: usize = 1000;
const MAX_FILTER_DEPTH: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CmpOp {
    Eq,
    Ne,
    Gt,
    Gte,
    Lt,
    Lte,
}

#[derive(Debug, Clone)]
pub(crate) enum Filter {
    True,
    And(Vec<Filter>),
    Or(Vec<Filter>),
    Nor(Vec<Filter>),
    Not(Box<Filter>),
    Exists { path: String, exists: bool },
    In { path: String, values: Vec<Bson> },
    Nin { path: String, values: Vec<Bson> },
    Cmp { path: String, op: CmpOp, value: Bson },
}

fn bad_query(msg: impl Into<String>) -> DbError {
    DbError::Store(msg.into())
}

/// Parses a filter document into a `Filter` tree. Unknown operators are rejected.
pub(crate) fn parse_filter(doc: &Document) -> Result<Filter, DbError> {
    parse_filter_at(doc, 0)
}

fn parse_filter_at(doc: &Document, depth: usize) -> Result<Filter, DbError> {
    if depth > MAX_FILTER_DEPTH {
        return Err(bad_query("filter nesting too deep"));
    }
    let mut clauses = Vec::with_capacity(doc.len());
    for (key, value) in doc {
        match key.as_str() {
            "$and" | "$or" | "$nor" => {
                let Bson::Array(items) = value else {
                    return Err(bad_query(format!("{key} must be an array")));
                };
                if items.is_empty() {
                    return Err(bad_query(format!("{key} must be a nonempty array")));
                }
                let mut subs = Vec::with_capacity(items.len());
                for item in items {
                    let Bson::Document(d) = item else {
                        return Err(bad_query(format!("{key} entries must be documents")));
                    };
                    subs.push(parse_filter_at(d, depth + 1)?);
                }
                clauses.push(match key.as_str() {
                    "$and" => Filter::And(subs),
                    "$or" => Filter::Or(subs),
                    _ => Filter::Nor(subs),
                });
            }
            k if k.starts_with('$') => {
                return Err(bad_query(format!("unknown top level operator: {k}")));
            }
            path => match value {
                Bson::Document(ops) if ops.keys().next().is_some_and(|k| k.starts_with('$')) => {
                    clauses.push(parse_operators(path, ops, depth + 1)?);
                }
                v => clauses.push(Filter::Cmp { path: path.to_string(), op: CmpOp::Eq, value: v.clone() }),
            },
        }
    }
    Ok(match clauses.len() {
        0 => Filter::True,
        1 => clauses.remove(0),
        _ => Filter::And(clauses),
    })
}

fn parse_operators(path: &str, ops: &Document, depth: usize) -> Result<Filter, DbError> {
    if depth > MAX_FILTER_DEPTH {
        return Err(bad_query("filter nesting too deep"));
    }
    let mut clauses = Vec::with_capacity(ops.len());
    for (op, arg) in ops {
        let cmp = |op: CmpOp| Filter::Cmp { path: path.to_string(), op, value: arg.clone() };
        clauses.push(match op.as_str() {
            "$eq" => cmp(CmpOp::Eq),
            "$ne" => cmp(CmpOp::Ne),
            "$gt" => cmp(CmpOp::Gt),
            "$gte" => cmp(CmpOp::Gte),
            "$lt" => cmp(CmpOp::Lt),
            "$lte" => cmp(CmpOp::Lte),
            "$in" | "$nin" => {
                let Bson::Array(values) = arg else {
                    return Err(bad_query(format!("{op} needs an array")));
                };
                if values.len() > MAX_IN_SET {
                    return Err(bad_query(format!(
                        "{op} array too large: {} values, at most {MAX_IN_SET}",
                        values.len()
                    )));
                }
                let values = values.clone();
                if op == "$in" {
                    Filter::In { path: path.to_string(), values }
                } else {
                    Filter::Nin { path: path.to_string(), values }
                }
            }
            "$exists" => Filter::Exists { path: path.to_string(), exists: is_truthy(arg) },
            "$not" => {
                let Bson::Document(inner) = arg else {
                    return Err(bad_query("$not needs a document of operators"));
                };
                if inner.is_empty() {
                    return Err(bad_query("$not cannot be empty"));
                }
                Filter::Not(Box::new(parse_operators(path, inner, depth + 1)?))
            }
            other => return Err(bad_query(format!("unknown operator: {other}"))),
        });
    }
    Ok(if clauses.len() == 1 { clauses.remove(0) } else { Filter::And(clauses) })
}

pub(crate) fn is_truthy(v: &Bson) -> bool {
    match v {
        Bson::Boolean(b) => *b,
        Bson::Int32(i) => *i != 0,
        Bson::Int64(i) => *i != 0,
        Bson::Double(f) => *f != 0.0,
        Bson::Null | Bson::Undefined => false,
        _ => true,
    }
}

pub(crate) fn eval_filter(doc: &Document, filter: &Filter) -> bool {
    match filter {
        Filter::True => true,
        Filter::And(fs) => fs.iter().all(|f| eval_filter(doc, f)),
        Filter::Or(fs) => fs.iter().any(|f| eval_filter(doc, f)),
        Filter::Nor(fs) => !fs.iter().any(|f| eval_filter(doc, f)),
        Filter::Not(f) => !eval_filter(doc, f),
        Filter::Exists { path, exists } => !lookup(doc, path).is_empty() == *exists,
        Filter::In { path, values } => matches_any(doc, path, values),
        Filter::Nin { path, values } => !matches_any(doc, path, values),
        Filter::Cmp { path, op, value } => match op {
            CmpOp::Eq => matches_eq(doc, path, value),
            CmpOp::Ne => !matches_eq(doc, path, value),
            CmpOp::Gt | CmpOp::Gte | CmpOp::Lt | CmpOp::Lte => {
                flattened(doc, path).into_iter().any(|v| {
                    if type_class(v) != type_class(value) {
                        return false;
                    }
                    let c = compare_bson(v, value);
                    match op {
                        CmpOp::Gt => c == Ordering::Greater,
                        CmpOp::Gte => c != Ordering::Less,
                        CmpOp::Lt => c == Ordering::Less,
                        _ => c != Ordering::Greater,
                    }
                })
            }
        },
    }
}

fn matches_eq(doc: &Document, path: &str, value: &Bson) -> bool {
    let found = lookup(doc, path);
    if found.is_empty() {
        return matches!(value, Bson::Null);
    }
    found.into_iter().any(|v| {
        bson_eq(v, value) || matches!(v, Bson::Array(items) if items.iter().any(|x| bson_eq(x, value)))
    })
}

fn matches_any(doc: &Document, path: &str, values: &[Bson]) -> bool {
    values.iter().any(|v| matches_eq(doc, path, v))
}

/// Equality with numeric coercion (`1 == 1.0 == 1i64`). Integer pairs compare exactly.
fn bson_eq(a: &Bson, b: &Bson) -> bool {
    if let (Some(x), Some(y)) = (as_i64_exact(a), as_i64_exact(b)) {
        return x == y;
    }
    if is_num(a) && is_num(b) {
        return as_f64_num(a) == as_f64_num(b);
    }
    a == b
}

/// All values reachable at a dotted path, descending into arrays of documents.
pub(crate) fn lookup<'a>(doc: &'a Document, path: &str) -> Vec<&'a Bson> {
    if path.is_empty() || path.len() > 1024 {
        return Vec::new();
    }
    let segs: Vec<&str> = path.split('.').collect();
    if segs.len() > MAX_PATH_DEPTH {
        return Vec::new();
    }
    let mut out = Vec::new();
    lookup_in(doc, &segs, &mut out);
    out
}

fn lookup_in<'a>(doc: &'a Document, segs: &[&str], out: &mut Vec<&'a Bson>) {
    let Some((head, rest)) = segs.split_first() else {
        return;
    };
    let Some(v) = doc.get(*head) else {
        return;
    };
    if rest.is_empty() {
        out.push(v);
        return;
    }
    match v {
        Bson::Document(d) => lookup_in(d, rest, out),
        Bson::Array(items) => {
            for item in items {
                if let Bson::Document(d) = item {
                    lookup_in(d, rest, out);
                }
            }
        }
        _ => {}
    }
}

fn flattened<'a>(doc: &'a Document, path: &str) -> Vec<&'a Bson> {
    let mut out = Vec::new();
    for v in lookup(doc, path) {
        match v {
            Bson::Array(items) => out.extend(items.iter()),
            other => out.push(other),
        }
    }
    out
}

fn is_num(x: &Bson) -> bool {
    matches!(x, Bson::Int32(_) | Bson::Int64(_) | Bson::Double(_) | Bson::Decimal128(_))
}

fn as_i64_exact(x: &Bson) -> Option<i64> {
    match x {
        Bson::Int32(i) => Some(i64::from(*i)),
        Bson::Int64(i) => Some(*i),
        _ => None,
    }
}

/// Numeric ordering; only a `Double` or `Decimal128` operand goes through `f64`.
fn compare_nums(a: &Bson, b: &Bson) -> Ordering {
    match (as_i64_exact(a), as_i64_exact(b)) {
        (Some(x), Some(y)) => x.cmp(&y),
        _ => as_f64_num(a).total_cmp(&as_f64_num(b)),
    }
}

#[allow(clippy::cast_precision_loss)]
fn as_f64_num(x: &Bson) -> f64 {
    match x {
        Bson::Int32(i) => f64::from(*i),
        Bson::Int64(i) => *i as f64,
        Bson::Double(f) => *f,
        Bson::Decimal128(d) => d.to_string().parse::<f64>().unwrap_or(f64::NAN),
        _ => f64::NAN,
    }
}

/// Canonical cross-type ordering bucket. Numbers share one bucket.
fn type_class(v: &Bson) -> u8 {
    match v {
        Bson::MinKey => 0,
        Bson::Null | Bson::Undefined => 1,
        Bson::Int32(_) | Bson::Int64(_) | Bson::Double(_) | Bson::Decimal128(_) => 2,
        Bson::String(_) | Bson::Symbol(_) => 3,
        Bson::Document(_) => 4,
        Bson::Array(_) => 5,
        Bson::Binary(_) => 6,
        Bson::ObjectId(_) => 7,
        Bson::Boolean(_) => 8,
        Bson::DateTime(_) => 9,
        Bson::Timestamp(_) => 10,
        Bson::RegularExpression(_) => 11,
        Bson::DbPointer(_) => 12,
        Bson::JavaScriptCode(_) => 13,
        Bson::JavaScriptCodeWithScope(_) => 14,
        Bson::MaxKey => 255,
    }
}

pub(crate) fn compare_bson(a: &Bson, b: &Bson) -> Ordering {
    let (ca, cb) = (type_class(a), type_class(b));
    if ca != cb {
        return ca.cmp(&cb);
    }
    match (a, b) {
        _ if is_num(a) && is_num(b) => compare_nums(a, b),
        (Bson::String(x), Bson::String(y)) => x.cmp(y),
        (Bson::Boolean(x), Bson::Boolean(y)) => x.cmp(y),
        (Bson::ObjectId(x), Bson::ObjectId(y)) => x.bytes().cmp(&y.bytes()),
        (Bson::DateTime(x), Bson::DateTime(y)) => x.timestamp_millis().cmp(&y.timestamp_millis()),
        (Bson::Timestamp(x), Bson::Timestamp(y)) => (x.time, x.increment).cmp(&(y.time, y.increment)),
        (Bson::Array(x), Bson::Array(y)) => {
            for (l, r) in x.iter().zip(y.iter()) {
                let c = compare_bson(l, r);
                if c != Ordering::Equal {
                    return c;
                }
            }
            x.len().cmp(&y.len())
        }
        (Bson::Document(x), Bson::Document(y)) => {
            for ((kl, vl), (kr, vr)) in x.iter().zip(y.iter()) {
                let c = compare_bson(vl, vr).then_with(|| kl.cmp(kr));
                if c != Ordering::Equal {
                    return c;
                }
            }
            x.len().cmp(&y.len())
        }
        _ => Ordering::Equal,
    }
}

/// Parsed sort clause: `(path, ascending)` in precedence order. A repeated path is kept; it can
/// only break ties its first occurrence already left.
pub(crate) fn parse_sort(spec: &[(String, i32)]) -> Result<Vec<(String, bool)>, DbError> {
    spec.iter()
        .map(|(field, dir)| match dir {
            1 => Ok((field.clone(), true)),
            -1 => Ok((field.clone(), false)),
            _ => Err(bad_query(format!("sort direction for {field} must be 1 or -1"))),
        })
        .collect()
}

pub(crate) fn compare_docs(a: &Document, b: &Document, sort: &[(String, bool)]) -> Ordering {
    for (field, ascending) in sort {
        let va = lookup(a, field).into_iter().next().unwrap_or(&Bson::Null);
        let vb = lookup(b, field).into_iter().next().unwrap_or(&Bson::Null);
        let ord = compare_bson(va, vb);
        if ord != Ordering::Equal {
            return if *ascending { ord } else { ord.reverse() };
        }
    }
    Ordering::Equal
}

#[derive(Debug, Clone)]
pub(crate) enum Projection {
    Include { fields: Vec<String>, keep_id: bool },
    Exclude { fields: Vec<String> },
}

pub(crate) fn parse_projection(spec: &Document) -> Result<Projection, DbError> {
    let mut include = Vec::new();
    let mut exclude = Vec::new();
    let mut id_spec = None;
    for (field, v) in spec {
        if matches!(v, Bson::Document(_) | Bson::Array(_)) {
            return Err(bad_query(format!("unsupported projection operator for {field}")));
        }
        if field == "_id" {
            id_spec = Some(is_truthy(v));
            continue;
        }
        if is_truthy(v) { include.push(field.clone()) } else { exclude.push(field.clone()) }
    }
    if !include.is_empty() && !exclude.is_empty() {
        return Err(bad_query(format!(
            "cannot do exclusion on field {} in inclusion projection",
            exclude[0]
        )));
    }
    if !include.is_empty() {
        return Ok(Projection::Include { fields: include, keep_id: id_spec != Some(false) });
    }
    match id_spec {
        Some(true) if exclude.is_empty() => Ok(Projection::Include { fields: Vec::new(), keep_id: true }),
        Some(false) => {
            exclude.push("_id".to_string());
            Ok(Projection::Exclude { fields: exclude })
        }
        _ => Ok(Projection::Exclude { fields: exclude }),
    }
}

/// # Errors
/// Returns an error if two included paths collide (e.g. `a` and `a.b` over a scalar `a`).
pub(crate) fn project(doc: &Document, projection: &Projection) -> Result<Document, DbError> {
    match projection {
        Projection::Include { fields, keep_id } => {
            let mut out = Document::new();
            if *keep_id && let Some(id) = doc.get("_id") {
                out.insert("_id", id.clone());
            }
            for f in fields {
                if let Some(v) = get_path(doc, f) {
                    set_path(&mut out, f, v)?;
                }
            }
            Ok(out)
        }
        Projection::Exclude { fields } => {
            let mut out = doc.clone();
            for f in fields {
                unset_path(&mut out, f);
            }
            Ok(out)
        }
    }
}

/// Subdocument at `key`, created when missing. A non-document value in the way is an error.
fn ensure_subdoc<'a>(root: &'a mut Document, key: &str) -> Result<&'a mut Document, DbError> {
    if !root.contains_key(key) {
        root.insert(key.to_string(), Bson::Document(Document::new()));
    }
    match root.get_mut(key) {
        Some(Bson::Document(d)) => Ok(d),
        Some(other) => Err(bad_query(format!("cannot create a subfield of {key}, which holds {other}"))),
        None => Err(bad_query(format!("cannot create field {key}"))),
    }
}

fn traverse_to_parent<'a>(root: &'a mut Document, path: &str) -> Result<(&'a mut Document, String), DbError> {
    let mut cur = root;
    let mut iter = path.split('.').peekable();
    let mut last = String::new();
    while let Some(seg) = iter.next() {
        if iter.peek().is_none() {
            last = seg.to_string();
            break;
        }
        cur = ensure_subdoc(cur, seg)?;
    }
    Ok((cur, last))
}

pub(crate) fn get_path(root: &Document, path: &str) -> Option<Bson> {
    let mut cur = root;
    let mut iter = path.split('.').peekable();
    while let Some(seg) = iter.next() {
        if iter.peek().is_none() {
            return cur.get(seg).cloned();
        }
        match cur.get(seg) {
            Some(Bson::Document(d)) => cur = d,
            _ => return None,
        }
    }
    None
}

pub(crate) fn set_path(root: &mut Document, path: &str, value: Bson) -> Result<(), DbError> {
    let (parent, last) = traverse_to_parent(root, path)?;
    parent.insert(last, value);
    Ok(())
}

fn unset_path(root: &mut Document, path: &str) -> bool {
    let mut cur = root;
    let mut iter = path.split('.').peekable();
    while let Some(seg) = iter.next() {
        if iter.peek().is_none() {
            return cur.remove(seg).is_some();
        }
        match cur.get_mut(seg) {
            Some(Bson::Document(d)) => cur = d,
            _ => return false,
        }
    }
    false
}

/// Operator update parsed from `{ $set, $unset, $inc }`.
#[derive(Debug, Default, Clone)]
pub(crate) struct UpdateDoc {
    pub set: Vec<(String, Bson)>,
    pub inc: Vec<(String, Bson)>,
    pub unset: Vec<String>,
}

pub(crate) fn parse_update(update: &Document) -> Result<UpdateDoc, DbError> {
    if update.is_empty() {
        return Err(bad_query("update document must not be empty"));
    }
    let mut out = UpdateDoc::default();
    for (op, arg) in update {
        let Bson::Document(fields) = arg else {
            return Err(bad_query(format!("{op} needs a document")));
        };
        if matches!(op.as_str(), "$inc" | "$unset")
            && let Some(k) = fields.keys().find(|k| is_id_path(k))
        {
            return Err(bad_query(format!("{op} cannot modify the immutable field {k}")));
        }
        match op.as_str() {
            "$set" => out.set.extend(fields.iter().map(|(k, v)| (k.clone(), v.clone()))),
            "$unset" => out.unset.extend(fields.keys().cloned()),
            "$inc" => {
                for (k, v) in fields {
                    if !is_num(v) {
                        return Err(bad_query(format!("cannot increment with non-numeric argument: {k}")));
                    }
                    out.inc.push((k.clone(), v.clone()));
                }
            }
            o if o.starts_with('$') => return Err(bad_query(format!("unknown update operator: {o}"))),
            _ => return Err(bad_query("update document requires atomic operators")),
        }
    }
    Ok(out)
}

fn is_id_path(path: &str) -> bool {
    path == "_id" || path.starts_with("_id.")
}

fn add_numbers(cur: &Bson, by: &Bson) -> Option<Bson> {
    Some(match (cur, by) {
        (Bson::Int32(a), Bson::Int32(b)) => {
            a.checked_add(*b).map_or_else(|| Bson::Int64(i64::from(*a) + i64::from(*b)), Bson::Int32)
        }
        (Bson::Int32(a), Bson::Int64(b)) => Bson::Int64(i64::from(*a).checked_add(*b)?),
        (Bson::Int64(a), Bson::Int32(b)) => Bson::Int64(a.checked_add(i64::from(*b))?),
        (Bson::Int64(a), Bson::Int64(b)) => Bson::Int64(a.checked_add(*b)?),
        (a, b) => Bson::Double(as_f64_num(a) + as_f64_num(b)),
    })
}

/// Applies an update to `doc`, returning whether it changed.
pub(crate) fn apply_update(doc: &mut Document, upd: &UpdateDoc) -> Result<bool, DbError> {
    let before = doc.clone();
    for (k, v) in &upd.set {
        if is_id_path(k) && get_path(doc, k).as_ref() != Some(v) {
            return Err(bad_query("the _id field cannot be modified"));
        }
        set_path(doc, k, v.clone())?;
    }
    for (k, by) in &upd.inc {
        let next = match get_path(doc, k) {
            None => by.clone(),
            Some(cur) if is_num(&cur) => {
                add_numbers(&cur, by).ok_or_else(|| bad_query(format!("$inc overflow on {k}")))?
            }
            Some(_) => {
                return Err(bad_query(format!("cannot apply $inc to a value of non-numeric type: {k}")));
            }
        };
        set_path(doc, k, next)?;
    }
    for k in &upd.unset {
        unset_path(doc, k);
    }
    Ok(*doc != before)
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;

    fn matches(d: &Document, f: Document) -> bool {
        eval_filter(d, &parse_filter(&f).unwrap())
    }

    #[test]
    fn equality_operators_and_arrays() {
        let d = doc! { "age": 30, "name": "alice", "tags": ["a", "b"], "info": { "visits": 2 } };
        assert!(matches(&d, doc! { "age": 30 }));
        assert!(matches(&d, doc! { "age": 30.0 }));
        assert!(matches(&d, doc! { "tags": "b" }));
        assert!(matches(&d, doc! { "info.visits": { "$gte": 2 } }));
        assert!(matches(&d, doc! { "age": { "$gt": 20, "$lt": 40 } }));
        assert!(!matches(&d, doc! { "age": { "$gt": "20" } }));
        assert!(matches(&d, doc! { "name": { "$in": ["bob", "alice"] } }));
        assert!(matches(&d, doc! { "name": { "$nin": ["bob"] } }));
        assert!(matches(&d, doc! { "missing": Bson::Null }));
        assert!(matches(&d, doc! { "missing": { "$exists": false } }));
        assert!(matches(&d, doc! { "age": { "$not": { "$gt": 40 } } }));
        assert!(matches(&d, doc! { "$or": [ { "age": 1 }, { "name": "alice" } ] }));
        assert!(!matches(&d, doc! { "$nor": [ { "name": "alice" } ] }));
        assert!(matches(&d, doc! { "age": { "$ne": 31 } }));
    }

    #[test]
    fn unknown_operators_are_rejected() {
        assert!(parse_filter(&doc! { "age": { "$near": 1 } }).is_err());
        assert!(parse_filter(&doc! { "$where": "1" }).is_err());
        assert!(parse_filter(&doc! { "$and": [] }).is_err());
    }

    #[test]
    fn sort_multi_key() {
        let mut docs = vec![
            doc! { "a": 1, "b": 2 },
            doc! { "a": 0, "b": 9 },
            doc! { "a": 1, "b": 1 },
        ];
        let spec = parse_sort(&[("a".to_string(), -1), ("b".to_string(), 1)]).unwrap();
        docs.sort_by(|x, y| compare_docs(x, y, &spec));
        assert_eq!(docs[0], doc! { "a": 1, "b": 1 });
        assert_eq!(docs[2], doc! { "a": 0, "b": 9 });
        assert!(parse_sort(&[("a".to_string(), 2)]).is_err());
        let repeated = parse_sort(&[("a".to_string(), 1), ("a".to_string(), -1)]).unwrap();
        assert_eq!(repeated, vec![("a".to_string(), true), ("a".to_string(), false)]);
    }

    #[test]
    fn projection_modes() {
        let d = doc! { "_id": 1, "k": 2, "v": 3, "sub": { "x": 1, "y": 2 } };
        let p = parse_projection(&doc! { "k": 1 }).unwrap();
        assert_eq!(project(&d, &p).unwrap(), doc! { "_id": 1, "k": 2 });
        let p = parse_projection(&doc! { "k": 1, "_id": 0 }).unwrap();
        assert_eq!(project(&d, &p).unwrap(), doc! { "k": 2 });
        let p = parse_projection(&doc! { "v": 0, "sub.y": 0 }).unwrap();
        assert_eq!(project(&d, &p).unwrap(), doc! { "_id": 1, "k": 2, "sub": { "x": 1 } });
        let p = parse_projection(&doc! { "_id": 1 }).unwrap();
        assert_eq!(project(&d, &p).unwrap(), doc! { "_id": 1 });
        let p = parse_projection(&doc! { "sub.x": 1 }).unwrap();
        assert_eq!(project(&d, &p).unwrap(), doc! { "_id": 1, "sub": { "x": 1 } });
        assert!(parse_projection(&doc! { "k": 1, "v": 0 }).is_err());
    }

    #[test]
    fn update_set_inc_unset() {
        let mut d = doc! { "_id": 1, "x": 1, "y": 2, "info": { "visits": 1_i64 } };
        let upd = parse_update(&doc! {
            "$set": { "y": 5 },
            "$inc": { "x": 2, "info.visits": 2, "fresh": 1.5 },
            "$unset": { "z": "" },
        })
        .unwrap();
        assert!(apply_update(&mut d, &upd).unwrap());
        assert_eq!(d.get_i32("x").unwrap(), 3);
        assert_eq!(d.get_i32("y").unwrap(), 5);
        assert_eq!(d.get_document("info").unwrap().get_i64("visits").unwrap(), 3);
        assert_eq!(d.get_f64("fresh").unwrap(), 1.5);
        let noop = parse_update(&doc! { "$set": { "y": 5 } }).unwrap();
        assert!(!apply_update(&mut d, &noop).unwrap());
        assert!(parse_update(&doc! { "y": 5 }).is_err());
        let bad = parse_update(&doc! { "$set": { "_id": 2 } }).unwrap();
        assert!(apply_update(&mut d, &bad).is_err());
        let same = parse_update(&doc! { "$set": { "_id": 1 } }).unwrap();
        assert!(!apply_update(&mut d, &same).unwrap());
    }

    #[test]
    fn id_is_immutable_under_every_operator() {
        assert!(parse_update(&doc! { "$inc": { "_id": 1 } }).is_err());
        assert!(parse_update(&doc! { "$unset": { "_id": "" } }).is_err());
        assert!(parse_update(&doc! { "$inc": { "_id.n": 1 } }).is_err());
        let mut d = doc! { "_id": { "k": 1 } };
        let nested = parse_update(&doc! { "$set": { "_id.k": 2 } }).unwrap();
        assert!(apply_update(&mut d, &nested).is_err());
        assert_eq!(d, doc! { "_id": { "k": 1 } });
    }

    #[test]
    fn large_integers_compare_exactly() {
        let big = 1_i64 << 53;
        let a = doc! { "n": big };
        let b = doc! { "n": big + 1 };
        assert!(!matches(&a, doc! { "n": big + 1 }));
        assert!(matches(&b, doc! { "n": big + 1 }));
        assert!(matches(&b, doc! { "n": { "$gt": big } }));
        assert!(!matches(&a, doc! { "n": { "$in": [big + 1] } }));
        assert_eq!(compare_bson(&Bson::Int64(big), &Bson::Int64(big + 1)), Ordering::Less);
        assert_eq!(compare_bson(&Bson::Int32(7), &Bson::Int64(7)), Ordering::Equal);
        assert_eq!(compare_bson(&Bson::Int32(2), &Bson::Double(2.5)), Ordering::Less);
        assert!(matches(&doc! { "n": 3_i64 }, doc! { "n": 3.0 }));
    }

    #[test]
    fn oversized_in_list_is_rejected_not_truncated() {
        let at_cap: Vec<i32> = (0..1000).collect();
        assert!(parse_filter(&doc! { "v": { "$in": at_cap.clone() } }).is_ok());
        let over: Vec<i32> = (0..=1000).collect();
        assert!(parse_filter(&doc! { "v": { "$in": over.clone() } }).is_err());
        assert!(parse_filter(&doc! { "v": { "$nin": over } }).is_err());
        assert!(matches(&doc! { "v": 999 }, doc! { "v": { "$in": at_cap } }));
    }

    #[test]
    fn set_through_a_scalar_is_rejected() {
        let mut d = doc! { "_id": 1, "a": 1 };
        let upd = parse_update(&doc! { "$set": { "a.b": 2 } }).unwrap();
        assert!(apply_update(&mut d, &upd).is_err());
        let mut fresh = doc! { "_id": 1 };
        let upd = parse_update(&doc! { "$set": { "x.y.z": 2 } }).unwrap();
        assert!(apply_update(&mut fresh, &upd).unwrap());
        assert_eq!(fresh, doc! { "_id": 1, "x": { "y": { "z": 2 } } });
    }
}

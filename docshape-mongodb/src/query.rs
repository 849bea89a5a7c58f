//! Translation of filter expressions and sort keys into MongoDB syntax.

use bson::{Bson, Document, doc};

use docshape_core::{
    document::ID_FIELD,
    error::DocumentStoreError,
    query::{Expr, FieldOp, QueryVisitor, Sort, SortDirection},
};

/// Translates filter expressions into MongoDB query documents.
///
/// Field names are dotted paths and are passed through unescaped. String operators
/// match case-insensitively with the operand escaped as a regex literal.
pub(crate) struct MongoQueryTranslator;

impl MongoQueryTranslator {
    /// Translates an optional filter; `None` matches every document.
    pub(crate) fn translate(filter: Option<&Expr>) -> Result<Document, DocumentStoreError> {
        match filter {
            Some(expr) => MongoQueryTranslator.visit_expr(expr),
            None => Ok(doc! {}),
        }
    }
}

impl QueryVisitor for MongoQueryTranslator {
    type Output = Document;
    type Error = DocumentStoreError;

    fn visit_and(&mut self, exprs: &[Expr]) -> Result<Self::Output, Self::Error> {
        Ok(doc! {
            "$and": exprs
                .iter()
                .map(|expr| self.visit_expr(expr))
                .collect::<Result<Vec<_>, _>>()?,
        })
    }

    fn visit_or(&mut self, exprs: &[Expr]) -> Result<Self::Output, Self::Error> {
        Ok(doc! {
            "$or": exprs
                .iter()
                .map(|expr| self.visit_expr(expr))
                .collect::<Result<Vec<_>, _>>()?,
        })
    }

    // `$not` only applies to operator expressions; `$nor` negates a whole filter.
    fn visit_not(&mut self, expr: &Expr) -> Result<Self::Output, Self::Error> {
        Ok(doc! { "$nor": [self.visit_expr(expr)?] })
    }

    fn visit_exists(&mut self, field: &str, should_exist: bool) -> Result<Self::Output, Self::Error> {
        Ok(doc! { field: { "$exists": should_exist } })
    }

    fn visit_field(&mut self, field: &str, op: &FieldOp, value: &Bson) -> Result<Self::Output, Self::Error> {
        let condition = match op {
            FieldOp::Eq => doc! { "$eq": value },
            FieldOp::Ne => doc! { "$ne": value },
            FieldOp::Gt => doc! { "$gt": value },
            FieldOp::Gte => doc! { "$gte": value },
            FieldOp::Lt => doc! { "$lt": value },
            FieldOp::Lte => doc! { "$lte": value },
            FieldOp::Contains => match value {
                Bson::String(s) => doc! { "$regex": escape_regex(s), "$options": "i" },
                Bson::Array(items) => doc! { "$all": items },
                other => doc! { "$elemMatch": { "$eq": other } },
            },
            FieldOp::NotContains => match value {
                Bson::String(s) => doc! { "$not": { "$regex": escape_regex(s), "$options": "i" } },
                Bson::Array(items) => doc! { "$nin": items },
                other => doc! { "$ne": other },
            },
            FieldOp::StartsWith => match value {
                Bson::String(s) => doc! { "$regex": format!("^{}", escape_regex(s)), "$options": "i" },
                _ => return Err(unsupported("starts_with", field)),
            },
            FieldOp::EndsWith => match value {
                Bson::String(s) => doc! { "$regex": format!("{}$", escape_regex(s)), "$options": "i" },
                _ => return Err(unsupported("ends_with", field)),
            },
            FieldOp::AnyOf => doc! { "$in": as_array(value) },
            FieldOp::NoneOf => doc! { "$nin": as_array(value) },
        };

        Ok(doc! { field: condition })
    }
}

/// Builds a compound sort document, most significant key first.
///
/// `_id` is appended as a final tie-breaker so that skip/limit windows over equal
/// keys stay disjoint. Returns `None` for natural order.
pub(crate) fn sort_document(keys: &[Sort]) -> Option<Document> {
    if keys.is_empty() {
        return None;
    }

    let mut sort = Document::new();

    for key in keys {
        if !sort.contains_key(&key.field) {
            let direction = match key.direction {
                SortDirection::Asc => 1,
                SortDirection::Desc => -1,
            };
            sort.insert(key.field.clone(), direction);
        }
    }

    if !sort.contains_key(ID_FIELD) {
        sort.insert(ID_FIELD, 1);
    }

    Some(sort)
}

fn as_array(value: &Bson) -> Bson {
    match value {
        Bson::Array(_) => value.clone(),
        single => Bson::Array(vec![single.clone()]),
    }
}

fn escape_regex(input: &str) -> String {
    let mut escaped = String::with_capacity(input.len());

    for ch in input.chars() {
        if "\\.+*?()|[]{}^$".contains(ch) {
            escaped.push('\\');
        }
        escaped.push(ch);
    }

    escaped
}

fn unsupported(op: &str, field: &str) -> DocumentStoreError {
    DocumentStoreError::Backend(format!("{op} on {field} requires a string value"))
}

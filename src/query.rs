//! The `Query` AST the engine consumes. The SQL parser that produces
//! one is an external collaborator; this module only owns the data
//! model plus a small builder so the engine is testable and usable
//! without it.

use std::path::PathBuf;

use crate::header::canonicalize;
use crate::predicate::Expr;

#[derive(Debug, Clone)]
pub enum Projection {
    All,
    Columns(Vec<String>),
}

#[derive(Debug, Clone)]
pub enum Source {
    Path(PathBuf),
    Stdin,
}

#[derive(Debug, Clone)]
pub struct Query {
    pub projection: Projection,
    pub source: Source,
    pub predicate: Option<Expr>,
    pub limit: Option<u64>,
}

impl Query {
    pub fn builder(source: Source) -> QueryBuilder {
        QueryBuilder::new(source)
    }
}

pub struct QueryBuilder {
    projection: Projection,
    source: Source,
    predicate: Option<Expr>,
    limit: Option<u64>,
}

impl QueryBuilder {
    pub fn new(source: Source) -> Self {
        QueryBuilder {
            projection: Projection::All,
            source,
            predicate: None,
            limit: None,
        }
    }

    pub fn select_all(mut self) -> Self {
        self.projection = Projection::All;
        self
    }

    pub fn select(mut self, columns: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.projection =
            Projection::Columns(columns.into_iter().map(|c| canonicalize(&c.into())).collect());
        self
    }

    pub fn filter(mut self, predicate: Expr) -> Self {
        self.predicate = Some(predicate);
        self
    }

    pub fn limit(mut self, n: u64) -> Self {
        self.limit = Some(n);
        self
    }

    pub fn build(self) -> Query {
        Query {
            projection: self.projection,
            source: self.source,
            predicate: self.predicate,
            limit: self.limit,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn select_canonicalizes_column_names() {
        let query = Query::builder(Source::Path("src.csv".into()))
            .select([" Id ", "Total"])
            .build();

        match query.projection {
            Projection::Columns(cols) => assert_eq!(cols, vec!["id", "total"]),
            Projection::All => panic!("expected Columns"),
        }
    }

    #[test]
    fn default_projection_is_all() {
        let query = Query::builder(Source::Stdin).build();
        assert!(matches!(query.projection, Projection::All));
    }

    #[test]
    fn builder_threads_predicate_and_limit() {
        let query = Query::builder(Source::Path("src.csv".into()))
            .filter(Expr::eq("country", "UK"))
            .limit(5)
            .build();

        assert!(query.predicate.is_some());
        assert_eq!(query.limit, Some(5));
    }
}

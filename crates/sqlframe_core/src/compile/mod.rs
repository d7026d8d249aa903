//! Compile a dataframe's lineage into a single SQL statement.
//!
//! The lineage is walked depth first. Every node reachable from the root is
//! compiled at most once per statement: base relations are referenced by
//! name, every other input becomes a CTE referenced by its generated name
//! from all of its consumers.

mod render;

use std::collections::HashMap;
use std::sync::Arc;

use sqlframe_error::{DbError, Result};
use tracing::debug;

pub use render::Bindings;

use crate::dataframe::arena::{NodeArena, NodeRef};
use crate::dataframe::node::{JoinKind, JoinOutput, Node, NodeKind, Projection};
use crate::functions::remote::RemoteFunction;
use crate::ident::{QualifiedName, quote_ident};
use crate::order::OrderByExpr;
use crate::types::{DataType, ScalarValue};

/// A compiled statement ready for execution.
#[derive(Debug, Clone)]
pub struct CompiledQuery {
    pub sql: String,
    /// Values for the `$n` placeholders, in order.
    pub params: Vec<ScalarValue>,
    /// Functions that need to be deployed before the statement runs.
    pub functions: Vec<Arc<RemoteFunction>>,
    /// Backend relations read by the statement.
    pub relations: Vec<QualifiedName>,
}

#[derive(Debug)]
pub struct QueryCompiler<'a> {
    arena: &'a NodeArena,
    function_schema: &'a str,
    counter: usize,
    /// Source name of every node compiled so far.
    compiled: HashMap<NodeRef, String>,
    ctes: Vec<(String, String)>,
    params: Vec<ScalarValue>,
    functions: Vec<Arc<RemoteFunction>>,
    relations: Vec<QualifiedName>,
}

/// Clauses folded into a single select.
#[derive(Debug, Default)]
struct Tail<'a> {
    limit: Option<(Option<u64>, u64)>,
    distinct: Option<&'a [String]>,
    order: Option<&'a [OrderByExpr]>,
}

impl<'a> QueryCompiler<'a> {
    pub fn new(arena: &'a NodeArena, function_schema: &'a str) -> Self {
        QueryCompiler {
            arena,
            function_schema,
            counter: 0,
            compiled: HashMap::new(),
            ctes: Vec::new(),
            params: Vec::new(),
            functions: Vec::new(),
            relations: Vec::new(),
        }
    }

    pub fn compile(mut self, root: NodeRef) -> Result<CompiledQuery> {
        let body = self.select(root)?;

        let sql = if self.ctes.is_empty() {
            body
        } else {
            let ctes: Vec<_> = self
                .ctes
                .iter()
                .map(|(name, sql)| format!("{name} AS ({sql})"))
                .collect();
            format!("WITH {} {body}", ctes.join(", "))
        };

        debug!(
            %root,
            nodes = self.compiled.len() + 1,
            ctes = self.ctes.len(),
            sql_len = sql.len(),
            "compiled query"
        );

        Ok(CompiledQuery {
            sql,
            params: self.params,
            functions: self.functions,
            relations: self.relations,
        })
    }

    /// Get the name a node is referenced by in a FROM clause, compiling it
    /// if it hasn't been compiled yet.
    pub(crate) fn source(&mut self, node_ref: NodeRef) -> Result<String> {
        if let Some(name) = self.compiled.get(&node_ref) {
            return Ok(name.clone());
        }

        let node = self.arena.get(node_ref)?;
        let name = match &node.kind {
            NodeKind::Table { name } | NodeKind::Saved { name, .. } => {
                self.add_relation(name);
                name.to_string()
            }
            _ => {
                let sql = self.select(node_ref)?;
                let name = quote_ident(&format!("cte_{}_{}", self.ctes.len(), node_ref.node_idx));
                self.ctes.push((name.clone(), sql));
                name
            }
        };

        self.compiled.insert(node_ref, name.clone());
        Ok(name)
    }

    fn add_relation(&mut self, name: &QualifiedName) {
        if !self.relations.contains(name) {
            self.relations.push(name.clone());
        }
    }

    pub(crate) fn add_function(&mut self, function: &Arc<RemoteFunction>) {
        if function.is_builtin() {
            return;
        }
        if !self.functions.iter().any(|f| Arc::ptr_eq(f, function)) {
            self.functions.push(function.clone());
        }
    }

    fn next_alias(&mut self) -> String {
        let alias = quote_ident(&format!("t_{}", self.counter));
        self.counter += 1;
        alias
    }

    /// Bind a value, returning its placeholder.
    pub(crate) fn push_param(&mut self, value: ScalarValue, datatype: &DataType) -> String {
        if value.is_null() {
            return format!("NULL::{}", datatype.sql_name());
        }
        self.params.push(value);
        format!("${}::{}", self.params.len(), datatype.sql_name())
    }

    fn node(&self, node_ref: NodeRef) -> Result<&'a Arc<Node>> {
        self.arena.get(node_ref)
    }

    /// Compile the select statement producing a node's rows.
    fn select(&mut self, node_ref: NodeRef) -> Result<String> {
        let node = self.node(node_ref)?;
        match &node.kind {
            NodeKind::Table { .. } | NodeKind::Saved { .. } => {
                let source = self.source(node_ref)?;
                let alias = self.next_alias();
                Ok(format!("SELECT * FROM {source} AS {alias}"))
            }
            NodeKind::Values { rows } => self.select_values(node, rows),
            NodeKind::Filter { input, predicate } => {
                let (from, bindings) = self.from_single(*input)?;
                let predicate = self.render_expr(predicate, &bindings)?;
                Ok(format!("SELECT * FROM {from} WHERE {predicate}"))
            }
            NodeKind::Project { input, projection } => self.select_project(*input, projection),
            NodeKind::Join {
                left,
                right,
                kind,
                condition,
                outputs,
            } => self.select_join(*left, *right, *kind, condition.as_ref(), outputs),
            NodeKind::Aggregate {
                input,
                grouping,
                outputs,
            } => {
                let (from, bindings) = self.from_single(*input)?;
                let mut select_list = Vec::new();
                for key in grouping.flatten() {
                    let col = format!("{}.{}", bindings.alias_of(*input)?, quote_ident(&key));
                    select_list.push(format!("{col} AS {}", quote_ident(&key)));
                }
                for (name, expr) in outputs {
                    let expr = self.render_expr(expr, &bindings)?;
                    select_list.push(format!("{expr} AS {}", quote_ident(name)));
                }
                let mut sql = format!("SELECT {} FROM {from}", select_list.join(", "));
                if let Some(group_by) = grouping.to_sql(bindings.alias_of(*input)?) {
                    sql.push(' ');
                    sql.push_str(&group_by);
                }
                Ok(sql)
            }
            NodeKind::Expand {
                input,
                keep,
                fields,
            } => {
                let (from, bindings) = self.from_single(*input)?;
                let alias = bindings.alias_of(*input)?;
                let mut select_list: Vec<_> = keep
                    .iter()
                    .map(|k| format!("{alias}.{}", quote_ident(k)))
                    .collect();
                let result = format!(
                    "({alias}.{})",
                    quote_ident(crate::dataframe::node::RESULT_COLUMN)
                );
                select_list.extend(
                    fields
                        .iter()
                        .map(|f| format!("{result}.{} AS {}", quote_ident(f), quote_ident(f))),
                );
                Ok(format!("SELECT {} FROM {from}", select_list.join(", ")))
            }
            NodeKind::Order { .. } | NodeKind::Distinct { .. } | NodeKind::Limit { .. } => {
                self.select_tail(node_ref)
            }
        }
    }

    /// `FROM <input> AS <alias>`, with bindings resolving the input's
    /// columns to the alias.
    fn from_single(&mut self, input: NodeRef) -> Result<(String, Bindings)> {
        let source = self.source(input)?;
        let alias = self.next_alias();
        let from = format!("{source} AS {alias}");
        Ok((from, Bindings::single(input, alias)))
    }

    fn select_values(&mut self, node: &Node, rows: &[Vec<ScalarValue>]) -> Result<String> {
        let schema = node
            .schema
            .resolved()
            .ok_or_else(|| DbError::new("Values node without a resolved schema"))?;

        if rows.is_empty() {
            let columns: Vec<_> = schema
                .columns()
                .iter()
                .map(|c| format!("NULL::{} AS {}", c.datatype.sql_name(), quote_ident(&c.name)))
                .collect();
            return Ok(format!("SELECT {} WHERE false", columns.join(", ")));
        }

        let mut tuples = Vec::with_capacity(rows.len());
        for row in rows {
            let values: Vec<_> = row
                .iter()
                .zip(schema.columns())
                .map(|(value, col)| self.push_param(value.clone(), &col.datatype))
                .collect();
            tuples.push(format!("({})", values.join(", ")));
        }

        let alias = self.next_alias();
        let names: Vec<_> = schema.names().map(quote_ident).collect();
        Ok(format!(
            "SELECT * FROM (VALUES {}) AS {alias} ({})",
            tuples.join(", "),
            names.join(", ")
        ))
    }

    fn select_project(&mut self, input: Option<NodeRef>, projection: &Projection) -> Result<String> {
        let (from, bindings) = match input {
            Some(input) => {
                let (from, bindings) = self.from_single(input)?;
                (Some(from), bindings)
            }
            None => (None, Bindings::default()),
        };

        let select_list = match projection {
            Projection::Wildcard => "*".to_string(),
            Projection::Exprs(exprs) => {
                let mut list = Vec::with_capacity(exprs.len());
                for (name, expr) in exprs {
                    let expr = self.render_expr(expr, &bindings)?;
                    list.push(format!("{expr} AS {}", quote_ident(name)));
                }
                list.join(", ")
            }
        };

        Ok(match from {
            Some(from) => format!("SELECT {select_list} FROM {from}"),
            None => format!("SELECT {select_list}"),
        })
    }

    fn select_join(
        &mut self,
        left: NodeRef,
        right: NodeRef,
        kind: JoinKind,
        condition: Option<&crate::expr::Expression>,
        outputs: &[JoinOutput],
    ) -> Result<String> {
        let left_source = self.source(left)?;
        let right_source = self.source(right)?;
        let left_alias = self.next_alias();
        let right_alias = self.next_alias();
        let bindings = Bindings::join(left, left_alias.clone(), right, right_alias.clone());

        let mut select_list = Vec::with_capacity(outputs.len());
        for output in outputs {
            match output {
                JoinOutput::Column { name, expr } => {
                    let expr = self.render_expr(expr, &bindings)?;
                    select_list.push(format!("{expr} AS {}", quote_ident(name)));
                }
                JoinOutput::Wildcard(side) => {
                    select_list.push(format!("{}.*", bindings.alias_of(*side)?));
                }
            }
        }

        let mut sql = format!(
            "SELECT {} FROM {left_source} AS {left_alias} {} {right_source} AS {right_alias}",
            select_list.join(", "),
            kind.as_sql(),
        );
        if let Some(condition) = condition {
            let condition = self.render_expr(condition, &bindings)?;
            sql.push_str(" ON ");
            sql.push_str(&condition);
        }
        Ok(sql)
    }

    /// Compile a chain of limit, distinct and order nodes into one select.
    ///
    /// Folding happens top down in that order only. An ordering below a
    /// distinct provides the tie break for which row is kept, and limits
    /// apply after both.
    fn select_tail(&mut self, node_ref: NodeRef) -> Result<String> {
        let mut tail = Tail::default();
        let mut current = self.node(node_ref)?;
        let mut base = node_ref;

        if let NodeKind::Limit {
            input,
            limit,
            offset,
        } = &current.kind
        {
            tail.limit = Some((*limit, *offset));
            base = *input;
            current = self.node(base)?;
        }
        if let NodeKind::Distinct { input, on } = &current.kind {
            tail.distinct = Some(on);
            base = *input;
            current = self.node(base)?;
        }
        if let NodeKind::Order { input, orderings } = &current.kind {
            tail.order = Some(orderings);
            base = *input;
        }

        let (from, bindings) = self.from_single(base)?;
        let alias = bindings.alias_of(base)?.to_string();

        let mut sql = String::from("SELECT ");
        let mut order_by = Vec::new();

        if let Some(on) = tail.distinct {
            if on.is_empty() {
                sql.push_str("DISTINCT ");
            } else {
                let keys: Vec<_> = on
                    .iter()
                    .map(|k| format!("{alias}.{}", quote_ident(k)))
                    .collect();
                sql.push_str(&format!("DISTINCT ON ({}) ", keys.join(", ")));
                order_by.extend(keys);
            }
        }

        sql.push_str("* FROM ");
        sql.push_str(&from);

        if let Some(orderings) = tail.order {
            for ordering in orderings {
                order_by.push(self.render_ordering(ordering, &bindings)?);
            }
        }
        if !order_by.is_empty() {
            sql.push_str(" ORDER BY ");
            sql.push_str(&order_by.join(", "));
        }

        if let Some((limit, offset)) = tail.limit {
            if let Some(limit) = limit {
                sql.push_str(&format!(" LIMIT {limit}"));
            }
            if offset > 0 {
                sql.push_str(&format!(" OFFSET {offset}"));
            }
        }

        Ok(sql)
    }

    fn render_ordering(&mut self, ordering: &OrderByExpr, bindings: &Bindings) -> Result<String> {
        let mut out = self.render_expr(&ordering.expr, bindings)?;
        match &ordering.using {
            Some(op) => {
                out.push_str(" USING ");
                out.push_str(op);
            }
            None if !ordering.ascending => out.push_str(" DESC"),
            None => (),
        }
        match ordering.nulls_first {
            Some(true) => out.push_str(" NULLS FIRST"),
            Some(false) => out.push_str(" NULLS LAST"),
            None => (),
        }
        Ok(out)
    }
}

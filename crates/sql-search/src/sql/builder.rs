//! An indenting SQL text builder.

use crate::schema::{Column, Table};

const INDENT: &str = "    ";

/// Accumulates SQL text with line-level indentation.
#[derive(Debug, Default, Clone)]
pub struct SqlBuilder {
    buf: String,
    indent: usize,
    at_line_start: bool,
}

impl SqlBuilder {
    /// Creates an empty builder.
    pub fn new() -> Self {
        Self {
            buf: String::new(),
            indent: 0,
            at_line_start: true,
        }
    }

    /// Appends text, indenting it if it starts a line.
    pub fn append(&mut self, text: &str) -> &mut Self {
        if text.is_empty() {
            return self;
        }
        if self.at_line_start {
            for _ in 0..self.indent {
                self.buf.push_str(INDENT);
            }
            self.at_line_start = false;
        }
        self.buf.push_str(text);
        self
    }

    /// Appends text followed by a newline.
    pub fn append_line(&mut self, text: &str) -> &mut Self {
        self.append(text);
        self.buf.push('\n');
        self.at_line_start = true;
        self
    }

    /// Ends the current line if anything was written on it.
    pub fn end_line(&mut self) -> &mut Self {
        if !self.at_line_start {
            self.buf.push('\n');
            self.at_line_start = true;
        }
        self
    }

    /// Appends a column reference, qualified by `alias` when given.
    pub fn append_column(&mut self, column: &Column, alias: Option<&str>) -> &mut Self {
        self.append_column_component(column, alias, None)
    }

    /// Appends a column reference with the composite component suffix.
    pub fn append_column_component(
        &mut self,
        column: &Column,
        alias: Option<&str>,
        component_index: Option<usize>,
    ) -> &mut Self {
        if let Some(alias) = alias {
            self.append(alias).append(".");
        }
        let name = column.name_for_component(component_index);
        self.append(&name)
    }

    /// Appends a table name.
    pub fn append_table(&mut self, table: &Table) -> &mut Self {
        self.append(table.name)
    }

    /// Increases the indentation of subsequent lines.
    pub fn indent(&mut self) -> &mut Self {
        self.indent += 1;
        self
    }

    /// Decreases the indentation of subsequent lines.
    pub fn outdent(&mut self) -> &mut Self {
        self.indent = self.indent.saturating_sub(1);
        self
    }

    /// The text built so far.
    pub fn as_str(&self) -> &str {
        &self.buf
    }

    /// Returns true if nothing has been written.
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Consumes the builder.
    pub fn into_string(self) -> String {
        self.buf
    }
}

/// Writes `WHERE a AND b ...` style clauses one element at a time.
#[derive(Debug)]
pub struct Delimiter {
    keyword: &'static str,
    started: bool,
}

impl Delimiter {
    /// A `WHERE` clause.
    pub fn where_clause() -> Self {
        Self {
            keyword: "WHERE ",
            started: false,
        }
    }

    /// An `ON` clause continuing an existing join line.
    pub fn on_clause() -> Self {
        Self {
            keyword: " ON ",
            started: false,
        }
    }

    /// Starts the next element, emitting the keyword or `AND`.
    pub fn begin_element(&mut self, sb: &mut SqlBuilder) {
        if self.started {
            sb.end_line().append("AND ");
        } else {
            sb.append(self.keyword);
            self.started = true;
        }
    }

    /// Returns true if any element was written.
    pub fn has_elements(&self) -> bool {
        self.started
    }

    /// Closes the clause.
    pub fn end(self, sb: &mut SqlBuilder) {
        if self.started {
            sb.end_line();
        }
    }
}

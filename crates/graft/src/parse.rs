//! Lowers the ruff AST into the crate's IR.
//!
//! Only the subset of Python the bridge needs is accepted; everything else is
//! rejected with a `ParseError::NotSupported` naming the construct.

use std::{borrow::Cow, fmt, sync::Arc};

use ruff_python_ast::{
    self as ast, BoolOp, CmpOp, ElifElseClause, Expr as AstExpr, Number, Operator as AstOperator, Stmt, UnaryOp,
};
use ruff_python_parser::{parse_expression, parse_module};
use ruff_text_size::{Ranged, TextRange};

use crate::{
    expressions::{ClassDef, CmpOperator, Expr, FunctionDef, ImportName, Node, Operator, Target},
    value::Value,
};

/// Maximum nesting depth for AST structures during parsing.
/// Matches CPython's limit of ~200 for nested parentheses.
#[cfg(not(debug_assertions))]
pub const MAX_NESTING_DEPTH: u16 = 200;
/// Debug builds have much larger stack frames, so the limit is lower.
#[cfg(debug_assertions)]
pub const MAX_NESTING_DEPTH: u16 = 35;

/// Parses a module (a sequence of statements).
pub(crate) fn parse(code: &str, filename: &str) -> Result<Vec<Node>, ParseError> {
    let mut parser = Parser::new(code, filename);
    let parsed = parse_module(code).map_err(|e| ParseError::syntax(e.to_string(), parser.convert_range(e.range())))?;
    let module = parsed.into_syntax();
    parser.parse_statements(module.body)
}

/// Parses a single expression, as accepted by `eval`.
pub(crate) fn parse_expr(code: &str, filename: &str) -> Result<Expr, ParseError> {
    let mut parser = Parser::new(code, filename);
    let parsed =
        parse_expression(code).map_err(|e| ParseError::syntax(e.to_string(), parser.convert_range(e.range())))?;
    let expression = parsed.into_syntax();
    parser.parse_expression(*expression.body)
}

struct Parser<'a> {
    /// Byte offset of each `\n`, to convert offsets to line and column numbers.
    line_ends: Vec<usize>,
    code: &'a str,
    filename: &'a str,
    /// Remaining nesting budget. When it reaches zero, parsing fails.
    depth_remaining: u16,
}

impl<'a> Parser<'a> {
    fn new(code: &'a str, filename: &'a str) -> Self {
        let line_ends = code
            .char_indices()
            .filter_map(|(i, c)| (c == '\n').then_some(i))
            .collect();
        Self {
            line_ends,
            code,
            filename,
            depth_remaining: MAX_NESTING_DEPTH,
        }
    }

    fn parse_statements(&mut self, statements: impl IntoIterator<Item = Stmt>) -> Result<Vec<Node>, ParseError> {
        statements.into_iter().map(|s| self.parse_statement(s)).collect()
    }

    fn parse_elif_else_clauses(&mut self, clauses: Vec<ElifElseClause>) -> Result<Vec<Node>, ParseError> {
        let mut tail: Vec<Node> = Vec::new();
        for clause in clauses.into_iter().rev() {
            match clause.test {
                Some(test) => {
                    let test = self.parse_expression(test)?;
                    let body = self.parse_statements(clause.body)?;
                    tail = vec![Node::If {
                        test,
                        body,
                        or_else: tail,
                    }];
                }
                None => {
                    tail = self.parse_statements(clause.body)?;
                }
            }
        }
        Ok(tail)
    }

    fn parse_statement(&mut self, statement: Stmt) -> Result<Node, ParseError> {
        self.decr_depth_remaining(|| statement.range())?;
        let result = self.parse_statement_impl(statement);
        self.depth_remaining += 1;
        result
    }

    fn parse_statement_impl(&mut self, statement: Stmt) -> Result<Node, ParseError> {
        match statement {
            Stmt::FunctionDef(function) => {
                let range = function.range;
                if function.is_async {
                    return Err(self.not_supported("async functions", range));
                }
                if !function.decorator_list.is_empty() {
                    return Err(self.not_supported("decorators", range));
                }
                let params = &function.parameters;
                if !params.posonlyargs.is_empty()
                    || params.vararg.is_some()
                    || !params.kwonlyargs.is_empty()
                    || params.kwarg.is_some()
                {
                    return Err(self.not_supported("parameters other than plain positional ones", range));
                }
                let mut names = Vec::with_capacity(params.args.len());
                for param in &params.args {
                    if param.default.is_some() {
                        return Err(self.not_supported("default parameter values", range));
                    }
                    names.push(param.parameter.name.as_str().to_owned());
                }
                let body = self.parse_statements(function.body)?;
                Ok(Node::FunctionDef(Arc::new(FunctionDef {
                    name: function.name.as_str().to_owned(),
                    params: names,
                    body,
                })))
            }
            Stmt::ClassDef(c) => {
                if !c.decorator_list.is_empty() {
                    return Err(self.not_supported("class decorators", c.range));
                }
                if c.type_params.is_some() {
                    return Err(self.not_supported("type parameters", c.range));
                }
                let bases = match c.arguments {
                    Some(arguments) => {
                        if !arguments.keywords.is_empty() {
                            return Err(self.not_supported("class keyword arguments", c.range));
                        }
                        self.parse_arguments(arguments.args.into_vec(), c.range)?
                    }
                    None => Vec::new(),
                };
                let body = self.parse_statements(c.body)?;
                Ok(Node::ClassDef(Arc::new(ClassDef {
                    name: c.name.as_str().to_owned(),
                    bases,
                    body,
                })))
            }
            Stmt::Return(ast::StmtReturn { value, .. }) => match value {
                Some(value) => Ok(Node::Return(Some(self.parse_expression(*value)?))),
                None => Ok(Node::Return(None)),
            },
            Stmt::Assign(ast::StmtAssign { targets, value, .. }) => {
                let targets = targets
                    .into_iter()
                    .map(|t| self.parse_target(t))
                    .collect::<Result<Vec<_>, _>>()?;
                let value = self.parse_expression(*value)?;
                Ok(Node::Assign { targets, value })
            }
            Stmt::If(ast::StmtIf {
                test,
                body,
                elif_else_clauses,
                ..
            }) => {
                let test = self.parse_expression(*test)?;
                let body = self.parse_statements(body)?;
                let or_else = self.parse_elif_else_clauses(elif_else_clauses)?;
                Ok(Node::If { test, body, or_else })
            }
            Stmt::Raise(ast::StmtRaise { exc, cause, range, .. }) => {
                if cause.is_some() {
                    return Err(self.not_supported("`raise ... from ...`", range));
                }
                let exc = match exc {
                    Some(expr) => Some(self.parse_expression(*expr)?),
                    None => None,
                };
                Ok(Node::Raise(exc))
            }
            Stmt::ImportFrom(ast::StmtImportFrom {
                module,
                names,
                level,
                range,
                ..
            }) => {
                let module = match module {
                    Some(module) if level == 0 => module.as_str().to_owned(),
                    _ => return Err(self.not_supported("relative imports", range)),
                };
                let names = names
                    .iter()
                    .map(|alias| {
                        if alias.name.as_str() == "*" {
                            return Err(self.not_supported("wildcard imports", range));
                        }
                        Ok(ImportName {
                            name: alias.name.as_str().to_owned(),
                            alias: alias.asname.as_ref().map(|asname| asname.as_str().to_owned()),
                        })
                    })
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(Node::ImportFrom { module, names })
            }
            Stmt::Expr(ast::StmtExpr { value, .. }) => self.parse_expression(*value).map(Node::Expr),
            Stmt::Pass(_) => Ok(Node::Pass),
            other => Err(self.not_supported(statement_name(&other), other.range())),
        }
    }

    fn parse_target(&mut self, target: AstExpr) -> Result<Target, ParseError> {
        match target {
            AstExpr::Name(ast::ExprName { id, .. }) => Ok(Target::Name(id.to_string())),
            AstExpr::Attribute(ast::ExprAttribute { value, attr, .. }) => Ok(Target::Attr {
                object: self.parse_expression(*value)?,
                attr: attr.as_str().to_owned(),
            }),
            AstExpr::Subscript(ast::ExprSubscript { value, slice, .. }) => Ok(Target::Subscript {
                object: self.parse_expression(*value)?,
                index: self.parse_expression(*slice)?,
            }),
            other => Err(self.not_supported("this assignment target", other.range())),
        }
    }

    fn parse_arguments(&mut self, args: Vec<AstExpr>, range: TextRange) -> Result<Vec<Expr>, ParseError> {
        args.into_iter()
            .map(|arg| match arg {
                AstExpr::Starred(_) => Err(self.not_supported("starred arguments", range)),
                other => self.parse_expression(other),
            })
            .collect()
    }

    fn parse_expression(&mut self, expression: AstExpr) -> Result<Expr, ParseError> {
        self.decr_depth_remaining(|| expression.range())?;
        let result = self.parse_expression_impl(expression);
        self.depth_remaining += 1;
        result
    }

    fn parse_expression_impl(&mut self, expression: AstExpr) -> Result<Expr, ParseError> {
        match expression {
            AstExpr::BoolOp(ast::ExprBoolOp { op, values, range, .. }) => {
                // `a and b and c` right-folds into `a and (b and c)`
                let op = convert_bool_op(op);
                let mut values = values.into_iter().rev();
                let last = values
                    .next()
                    .ok_or_else(|| ParseError::syntax("empty boolean operation", self.convert_range(range)))?;
                let mut result = self.parse_expression(last)?;
                for value in values {
                    result = Expr::Op {
                        left: Box::new(self.parse_expression(value)?),
                        op,
                        right: Box::new(result),
                    };
                }
                Ok(result)
            }
            AstExpr::BinOp(ast::ExprBinOp {
                left, op, right, range, ..
            }) => {
                let op = convert_op(op).ok_or_else(|| self.not_supported("this binary operator", range))?;
                Ok(Expr::Op {
                    left: Box::new(self.parse_expression(*left)?),
                    op,
                    right: Box::new(self.parse_expression(*right)?),
                })
            }
            AstExpr::UnaryOp(ast::ExprUnaryOp { op, operand, range, .. }) => match op {
                UnaryOp::Not => Ok(Expr::Not(Box::new(self.parse_expression(*operand)?))),
                UnaryOp::USub => Ok(Expr::Neg(Box::new(self.parse_expression(*operand)?))),
                UnaryOp::UAdd | UnaryOp::Invert => Err(self.not_supported("this unary operator", range)),
            },
            AstExpr::Compare(ast::ExprCompare {
                left,
                ops,
                comparators,
                range,
                ..
            }) => {
                let ops = ops.into_vec();
                let comparators = comparators.into_vec();
                if ops.len() != 1 {
                    return Err(self.not_supported("chained comparisons", range));
                }
                let (Some(op), Some(right)) = (ops.into_iter().next(), comparators.into_iter().next()) else {
                    return Err(ParseError::syntax("malformed comparison", self.convert_range(range)));
                };
                Ok(Expr::CmpOp {
                    left: Box::new(self.parse_expression(*left)?),
                    op: convert_compare_op(op),
                    right: Box::new(self.parse_expression(right)?),
                })
            }
            AstExpr::Call(ast::ExprCall {
                func, arguments, range, ..
            }) => {
                let ast::Arguments { args, keywords, .. } = arguments;
                if !keywords.is_empty() {
                    return Err(self.not_supported("keyword arguments", range));
                }
                let args = self.parse_arguments(args.into_vec(), range)?;
                Ok(Expr::Call {
                    callable: Box::new(self.parse_expression(*func)?),
                    args,
                })
            }
            AstExpr::StringLiteral(ast::ExprStringLiteral { value, .. }) => {
                Ok(Expr::Literal(Value::Str(value.to_string())))
            }
            AstExpr::NumberLiteral(ast::ExprNumberLiteral { value, range, .. }) => match value {
                Number::Int(i) => match i.as_i64() {
                    Some(i) => Ok(Expr::Literal(Value::Int(i))),
                    None => Err(self.not_supported("integers wider than 64 bits", range)),
                },
                Number::Float(_) | Number::Complex { .. } => Err(self.not_supported("non-integer numbers", range)),
            },
            AstExpr::BooleanLiteral(ast::ExprBooleanLiteral { value, .. }) => Ok(Expr::Literal(Value::Bool(value))),
            AstExpr::NoneLiteral(_) => Ok(Expr::Literal(Value::None)),
            AstExpr::Attribute(ast::ExprAttribute { value, attr, .. }) => Ok(Expr::Attr {
                object: Box::new(self.parse_expression(*value)?),
                attr: attr.as_str().to_owned(),
            }),
            AstExpr::Subscript(ast::ExprSubscript { value, slice, .. }) => Ok(Expr::Subscript {
                object: Box::new(self.parse_expression(*value)?),
                index: Box::new(self.parse_expression(*slice)?),
            }),
            AstExpr::Name(ast::ExprName { id, .. }) => Ok(Expr::Name(id.to_string())),
            AstExpr::List(ast::ExprList { elts, range, .. }) | AstExpr::Tuple(ast::ExprTuple { elts, range, .. }) => {
                Ok(Expr::List(self.parse_arguments(elts, range)?))
            }
            AstExpr::Dict(ast::ExprDict { items, range, .. }) => {
                let mut pairs = Vec::with_capacity(items.len());
                for ast::DictItem { key, value } in items {
                    let Some(key) = key else {
                        return Err(self.not_supported("dict unpacking", range));
                    };
                    pairs.push((self.parse_expression(key)?, self.parse_expression(value)?));
                }
                Ok(Expr::Dict(pairs))
            }
            other => Err(self.not_supported(expression_name(&other), other.range())),
        }
    }

    fn not_supported(&self, construct: impl Into<Cow<'static, str>>, range: TextRange) -> ParseError {
        ParseError::NotSupported {
            construct: construct.into(),
            location: self.convert_range(range),
        }
    }

    fn convert_range(&self, range: TextRange) -> CodeLoc {
        let start: usize = range.start().into();
        let line_no = self.line_ends.partition_point(|&end| end < start);
        let line_start = if line_no == 0 { 0 } else { self.line_ends[line_no - 1] + 1 };
        let column = self
            .code
            .get(line_start..start)
            .map_or(0, |prefix| prefix.chars().count());
        CodeLoc {
            filename: self.filename.to_owned(),
            line: line_no + 1,
            column: column + 1,
        }
    }

    /// Decrements the depth remaining for nested structures.
    /// Returns an error if the depth remaining goes to zero.
    fn decr_depth_remaining(&mut self, get_range: impl FnOnce() -> TextRange) -> Result<(), ParseError> {
        if let Some(depth_remaining) = self.depth_remaining.checked_sub(1) {
            self.depth_remaining = depth_remaining;
            Ok(())
        } else {
            Err(ParseError::syntax("too many nested expressions", self.convert_range(get_range())))
        }
    }
}

fn convert_op(op: AstOperator) -> Option<Operator> {
    match op {
        AstOperator::Add => Some(Operator::Add),
        AstOperator::Sub => Some(Operator::Sub),
        AstOperator::Mult => Some(Operator::Mult),
        _ => None,
    }
}

fn convert_bool_op(op: BoolOp) -> Operator {
    match op {
        BoolOp::And => Operator::And,
        BoolOp::Or => Operator::Or,
    }
}

fn convert_compare_op(op: CmpOp) -> CmpOperator {
    match op {
        CmpOp::Eq => CmpOperator::Eq,
        CmpOp::NotEq => CmpOperator::NotEq,
        CmpOp::Lt => CmpOperator::Lt,
        CmpOp::LtE => CmpOperator::LtE,
        CmpOp::Gt => CmpOperator::Gt,
        CmpOp::GtE => CmpOperator::GtE,
        CmpOp::Is => CmpOperator::Is,
        CmpOp::IsNot => CmpOperator::IsNot,
        CmpOp::In => CmpOperator::In,
        CmpOp::NotIn => CmpOperator::NotIn,
    }
}

fn statement_name(statement: &Stmt) -> &'static str {
    match statement {
        Stmt::For(_) => "`for` loops",
        Stmt::While(_) => "`while` loops",
        Stmt::Try(_) => "`try` statements",
        Stmt::With(_) => "`with` statements",
        Stmt::Import(_) => "`import` statements",
        Stmt::AugAssign(_) => "augmented assignment",
        Stmt::AnnAssign(_) => "annotated assignment",
        Stmt::Delete(_) => "`del` statements",
        Stmt::Global(_) | Stmt::Nonlocal(_) => "`global` and `nonlocal`",
        _ => "this statement",
    }
}

fn expression_name(expression: &AstExpr) -> &'static str {
    match expression {
        AstExpr::Lambda(_) => "lambda expressions",
        AstExpr::If(_) => "conditional expressions",
        AstExpr::ListComp(_) | AstExpr::SetComp(_) | AstExpr::DictComp(_) | AstExpr::Generator(_) => {
            "comprehensions"
        }
        AstExpr::FString(_) => "f-strings",
        AstExpr::Set(_) => "set displays",
        AstExpr::Slice(_) => "slices",
        AstExpr::Starred(_) => "starred expressions",
        _ => "this expression",
    }
}

/// A 1-based position in a script.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodeLoc {
    pub filename: String,
    pub line: usize,
    pub column: usize,
}

impl fmt::Display for CodeLoc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.filename, self.line, self.column)
    }
}

/// Errors that can occur while parsing a script.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    /// The source is not valid Python.
    Syntax { msg: Cow<'static, str>, location: CodeLoc },
    /// Valid Python, but outside the subset the embedded interpreter runs.
    NotSupported {
        construct: Cow<'static, str>,
        location: CodeLoc,
    },
}

impl ParseError {
    fn syntax(msg: impl Into<Cow<'static, str>>, location: CodeLoc) -> Self {
        Self::Syntax {
            msg: msg.into(),
            location,
        }
    }

    #[must_use]
    pub fn location(&self) -> &CodeLoc {
        match self {
            Self::Syntax { location, .. } | Self::NotSupported { location, .. } => location,
        }
    }
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Syntax { msg, location } => write!(f, "SyntaxError: {msg} ({location})"),
            Self::NotSupported { construct, location } => {
                write!(f, "SyntaxError: {construct} not supported by the bridge interpreter ({location})")
            }
        }
    }
}

impl std::error::Error for ParseError {}

//! Compilation and execution of script source.
//!
//! The engine is deliberately scope-poor: a compiled unit resolves names
//! against exactly one flat local scope seeded from its bound parameters.
//! There is no ambient global environment to fall back to, so any name not
//! bound at invocation (or introduced by `let`) reads as `undefined`. Hosts
//! embedding the engine decide what, if anything, a unit can see.

use std::collections::HashMap;
use std::rc::Rc;

use crate::ast::{AssignTarget, BinaryOp, Block, Expr, Literal, Stmt, UnaryOp};
use crate::error::ScriptError;
use crate::parser;
use crate::value::{IdSource, Object, ObjectRef, PropertyHandler, Value};

/// Compiles source text and mints object identities.
///
/// Cloning an engine shares its [`IdSource`], keeping object ids unique
/// across every collaborator in the process.
#[derive(Debug, Clone, Default)]
pub struct ScriptEngine {
    ids: IdSource,
}

impl ScriptEngine {
    /// Creates an engine with a fresh id counter.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the shared id counter.
    #[must_use]
    pub const fn ids(&self) -> &IdSource {
        &self.ids
    }

    /// Creates a plain object.
    #[must_use]
    pub fn new_object(&self) -> ObjectRef {
        Object::new(self.ids.mint())
    }

    /// Creates an object whose property access is mediated by `handler`.
    #[must_use]
    pub fn new_object_with_handler(&self, handler: Rc<dyn PropertyHandler>) -> ObjectRef {
        Object::with_handler(self.ids.mint(), handler)
    }

    /// Compiles `source` into a callable unit with the given parameter list.
    ///
    /// # Errors
    ///
    /// Returns [`ScriptError::Syntax`] when the source does not lex or parse.
    pub fn compile(&self, source: &str, params: &[String]) -> Result<ScriptFunction, ScriptError> {
        let body = parser::parse(source)?;
        Ok(ScriptFunction {
            params: params.to_vec(),
            body: Rc::new(body),
        })
    }
}

/// A compiled, callable unit of script code.
#[derive(Debug, Clone)]
pub struct ScriptFunction {
    params: Vec<String>,
    body: Rc<Block>,
}

impl ScriptFunction {
    /// Returns the parameter names the unit was compiled with.
    #[must_use]
    pub fn params(&self) -> &[String] {
        &self.params
    }

    /// Executes the unit to completion with `args` bound positionally to the
    /// parameter list. Missing arguments bind as `undefined`; extra arguments
    /// are ignored. Returns the value of the first `return` statement, or
    /// `undefined` when execution falls off the end.
    ///
    /// # Errors
    ///
    /// Returns [`ScriptError::Runtime`] on any fault inside the unit.
    pub fn invoke(&self, args: &[Value]) -> Result<Value, ScriptError> {
        let mut scope: HashMap<String, Value> = HashMap::new();
        for (index, param) in self.params.iter().enumerate() {
            let value = args.get(index).cloned().unwrap_or(Value::Undefined);
            drop(scope.insert(param.clone(), value));
        }
        let mut interp = Interp { scope };
        match interp.exec_block(&self.body)? {
            Flow::Return(value) => Ok(value),
            Flow::Normal => Ok(Value::Undefined),
        }
    }
}

enum Flow {
    Normal,
    Return(Value),
}

struct Interp {
    scope: HashMap<String, Value>,
}

impl Interp {
    fn exec_block(&mut self, block: &Block) -> Result<Flow, ScriptError> {
        for statement in &block.statements {
            if let Flow::Return(value) = self.exec_stmt(statement)? {
                return Ok(Flow::Return(value));
            }
        }
        Ok(Flow::Normal)
    }

    fn exec_stmt(&mut self, statement: &Stmt) -> Result<Flow, ScriptError> {
        match statement {
            Stmt::Let { name, value } => {
                let evaluated = self.eval(value)?;
                drop(self.scope.insert(name.clone(), evaluated));
                Ok(Flow::Normal)
            }
            Stmt::Assign { target, value } => {
                let evaluated = self.eval(value)?;
                self.assign(target, evaluated)?;
                Ok(Flow::Normal)
            }
            Stmt::Return(expr) => {
                let value = match expr {
                    Some(expr) => self.eval(expr)?,
                    None => Value::Undefined,
                };
                Ok(Flow::Return(value))
            }
            Stmt::If {
                cond,
                then_block,
                else_block,
            } => {
                if self.eval(cond)?.is_truthy() {
                    self.exec_block(then_block)
                } else if let Some(block) = else_block {
                    self.exec_block(block)
                } else {
                    Ok(Flow::Normal)
                }
            }
            Stmt::Expr(expr) => {
                drop(self.eval(expr)?);
                Ok(Flow::Normal)
            }
        }
    }

    fn assign(&mut self, target: &AssignTarget, value: Value) -> Result<(), ScriptError> {
        match target {
            AssignTarget::Local(name) => {
                drop(self.scope.insert(name.clone(), value));
                Ok(())
            }
            AssignTarget::Member { object, property } => {
                let receiver = self.eval(object)?;
                match receiver.as_object() {
                    Some(obj) => obj.set(property, value),
                    None => Err(ScriptError::runtime(format!(
                        "cannot set property '{property}' of {}",
                        receiver.type_name()
                    ))),
                }
            }
        }
    }

    fn eval(&mut self, expr: &Expr) -> Result<Value, ScriptError> {
        match expr {
            Expr::Literal(literal) => Ok(eval_literal(literal)),
            Expr::Ident(name) => Ok(self.scope.get(name).cloned().unwrap_or(Value::Undefined)),
            Expr::Unary { op, expr: operand } => {
                let value = self.eval(operand)?;
                eval_unary(*op, &value)
            }
            Expr::Binary { op, lhs, rhs } => self.eval_binary(*op, lhs, rhs),
            Expr::Member { object, property } => {
                let receiver = self.eval(object)?;
                match receiver.as_object() {
                    Some(obj) => obj.get(property),
                    None => Err(ScriptError::runtime(format!(
                        "cannot read property '{property}' of {}",
                        receiver.type_name()
                    ))),
                }
            }
            Expr::Call { callee, args } => {
                let target = self.eval(callee)?;
                let mut evaluated = Vec::with_capacity(args.len());
                for arg in args {
                    evaluated.push(self.eval(arg)?);
                }
                match target {
                    Value::Native(func) => func.call(&evaluated),
                    other => Err(ScriptError::runtime(format!(
                        "value of type {} is not callable",
                        other.type_name()
                    ))),
                }
            }
        }
    }

    fn eval_binary(&mut self, op: BinaryOp, lhs: &Expr, rhs: &Expr) -> Result<Value, ScriptError> {
        // Short-circuit forms evaluate the right operand lazily.
        if matches!(op, BinaryOp::And | BinaryOp::Or) {
            let left = self.eval(lhs)?;
            return match (op, left.is_truthy()) {
                (BinaryOp::And, false) | (BinaryOp::Or, true) => Ok(left),
                _ => self.eval(rhs),
            };
        }

        let left = self.eval(lhs)?;
        let right = self.eval(rhs)?;
        match op {
            BinaryOp::Add => eval_add(&left, &right),
            BinaryOp::Sub => checked_arith(&left, &right, "-", i64::checked_sub),
            BinaryOp::Mul => checked_arith(&left, &right, "*", i64::checked_mul),
            BinaryOp::Eq => Ok(Value::Bool(left == right)),
            BinaryOp::Ne => Ok(Value::Bool(left != right)),
            BinaryOp::Lt => compare(&left, &right, "<", |ord| ord.is_lt()),
            BinaryOp::Gt => compare(&left, &right, ">", |ord| ord.is_gt()),
            BinaryOp::Le => compare(&left, &right, "<=", |ord| ord.is_le()),
            BinaryOp::Ge => compare(&left, &right, ">=", |ord| ord.is_ge()),
            BinaryOp::And | BinaryOp::Or => Ok(Value::Undefined),
        }
    }
}

fn eval_literal(literal: &Literal) -> Value {
    match literal {
        Literal::Int(value) => Value::Int(*value),
        Literal::Str(value) => Value::from(value.as_str()),
        Literal::Bool(value) => Value::Bool(*value),
        Literal::Null => Value::Null,
    }
}

fn eval_unary(op: UnaryOp, value: &Value) -> Result<Value, ScriptError> {
    match op {
        UnaryOp::Not => Ok(Value::Bool(!value.is_truthy())),
        UnaryOp::Neg => match value {
            Value::Int(i) => i.checked_neg().map(Value::Int).ok_or_else(|| {
                ScriptError::runtime("integer overflow in unary negation")
            }),
            other => Err(ScriptError::runtime(format!(
                "cannot negate a value of type {}",
                other.type_name()
            ))),
        },
    }
}

/// `+` adds integers and concatenates when either side is a string.
fn eval_add(left: &Value, right: &Value) -> Result<Value, ScriptError> {
    match (left, right) {
        (Value::Int(a), Value::Int(b)) => a
            .checked_add(*b)
            .map(Value::Int)
            .ok_or_else(|| ScriptError::runtime("integer overflow in '+'")),
        (Value::Str(_), _) | (_, Value::Str(_)) => Ok(Value::from(format!("{left}{right}"))),
        _ => Err(ScriptError::runtime(format!(
            "cannot apply '+' to {} and {}",
            left.type_name(),
            right.type_name()
        ))),
    }
}

fn checked_arith(
    left: &Value,
    right: &Value,
    symbol: &str,
    apply: impl Fn(i64, i64) -> Option<i64>,
) -> Result<Value, ScriptError> {
    match (left, right) {
        (Value::Int(a), Value::Int(b)) => apply(*a, *b)
            .map(Value::Int)
            .ok_or_else(|| ScriptError::runtime(format!("integer overflow in '{symbol}'"))),
        _ => Err(ScriptError::runtime(format!(
            "cannot apply '{symbol}' to {} and {}",
            left.type_name(),
            right.type_name()
        ))),
    }
}

fn compare(
    left: &Value,
    right: &Value,
    symbol: &str,
    accept: impl Fn(std::cmp::Ordering) -> bool,
) -> Result<Value, ScriptError> {
    match (left, right) {
        (Value::Int(a), Value::Int(b)) => Ok(Value::Bool(accept(a.cmp(b)))),
        (Value::Str(a), Value::Str(b)) => Ok(Value::Bool(accept(a.cmp(b)))),
        _ => Err(ScriptError::runtime(format!(
            "cannot apply '{symbol}' to {} and {}",
            left.type_name(),
            right.type_name()
        ))),
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;
    use std::rc::Rc;

    use rstest::rstest;

    use crate::value::NativeFunction;

    use super::*;

    fn run(source: &str) -> Value {
        let engine = ScriptEngine::new();
        let function = engine.compile(source, &[]).expect("compile");
        function.invoke(&[]).expect("invoke")
    }

    #[rstest]
    #[case::precedence("return 1 + 2 * 3;", 7)]
    #[case::subtraction("return 10 - 3;", 7)]
    #[case::negation("return -(2 + 5) + 14;", 7)]
    fn evaluates_arithmetic(#[case] source: &str, #[case] expected: i64) {
        assert_eq!(run(source), Value::Int(expected));
    }

    #[test]
    fn falls_off_the_end_as_undefined() {
        assert_eq!(run("let a = 1;"), Value::Undefined);
    }

    #[test]
    fn unresolved_identifier_reads_undefined() {
        assert_eq!(run("return document;"), Value::Undefined);
    }

    #[test]
    fn parameters_bind_positionally() {
        let engine = ScriptEngine::new();
        let function = engine
            .compile("return a + b;", &["a".into(), "b".into()])
            .expect("compile");
        let result = function.invoke(&[Value::Int(40), Value::Int(2)]).expect("invoke");
        assert_eq!(result, Value::Int(42));
        // A missing argument binds as undefined, and undefined is not addable.
        let err = function.invoke(&[Value::Int(40)]).expect_err("fault");
        assert!(!err.is_syntax());
    }

    #[test]
    fn string_concatenation() {
        assert_eq!(run("return \"answer: \" + 42;"), Value::from("answer: 42"));
    }

    #[test]
    fn if_else_branches() {
        assert_eq!(run("if (1 < 2) { return 1; } else { return 2; }"), Value::Int(1));
        assert_eq!(run("if (1 > 2) { return 1; } else { return 2; }"), Value::Int(2));
    }

    #[test]
    fn logical_operators_short_circuit() {
        let engine = ScriptEngine::new();
        let hits = Rc::new(Cell::new(0_u32));
        let hits_probe = hits.clone();
        let probe = NativeFunction::new("probe", move |_| {
            hits_probe.set(hits_probe.get() + 1);
            Ok(Value::Bool(true))
        });
        let function = engine
            .compile("return false && probe();", &["probe".into()])
            .expect("compile");
        let result = function.invoke(&[Value::Native(probe)]).expect("invoke");
        assert_eq!(result, Value::Bool(false));
        assert_eq!(hits.get(), 0);
    }

    #[test]
    fn member_access_and_method_call() {
        let engine = ScriptEngine::new();
        let obj = engine.new_object();
        obj.set("title", Value::from("home")).expect("set");
        obj.set(
            "greet",
            Value::Native(NativeFunction::new("greet", |args| {
                Ok(Value::from(format!(
                    "hello {}",
                    args.first().cloned().unwrap_or(Value::Undefined)
                )))
            })),
        )
        .expect("set");

        let function = engine
            .compile(
                "let t = page.title; return page.greet(t);",
                &["page".into()],
            )
            .expect("compile");
        let result = function.invoke(&[Value::Object(obj)]).expect("invoke");
        assert_eq!(result, Value::from("hello home"));
    }

    #[test]
    fn overflow_is_a_runtime_fault() {
        let engine = ScriptEngine::new();
        let function = engine
            .compile("return big + big;", &["big".into()])
            .expect("compile");
        let err = function.invoke(&[Value::Int(i64::MAX)]).expect_err("fault");
        assert_eq!(err, ScriptError::runtime("integer overflow in '+'"));
    }

    #[test]
    fn member_read_on_undefined_faults() {
        let engine = ScriptEngine::new();
        let function = engine.compile("return document.title;", &[]).expect("compile");
        let err = function.invoke(&[]).expect_err("fault");
        assert_eq!(
            err,
            ScriptError::runtime("cannot read property 'title' of undefined")
        );
    }
}

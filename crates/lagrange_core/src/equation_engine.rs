use crate::error::{SymbolicError, SymbolicResult};
use crate::expr::{Expr, Func};
use crate::traits::{DynamicalSystem, Scalar};
use std::cell::RefCell;
use std::collections::HashMap;
use std::f64::consts::PI;

/// OpCodes for the Stack-based Virtual Machine.
/// The VM operates on a stack of `Scalar` values.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum OpCode {
    /// Pushes a constant `f64` value onto the stack.
    LoadConst(f64),
    /// Pushes the value of an input variable (by index) onto the stack.
    LoadVar(usize),
    /// Pushes the value of a parameter (by index) onto the stack.
    LoadParam(usize),
    /// Pops top two values (b, a), pushes (a + b).
    Add,
    /// Pops top two values (b, a), pushes (a - b).
    Sub,
    /// Pops top two values (b, a), pushes (a * b).
    Mul,
    /// Pops top two values (b, a), pushes (a / b).
    Div,
    /// Pops top two values (b, a), pushes (a ^ b).
    Pow,
    /// Pops top value (a), pushes a^n for a small integer n.
    Powi(i32),
    /// Pops top value (a), pushes sqrt(a).
    Sqrt,
    /// Pops top value (a), pushes sin(a).
    Sin,
    /// Pops top value (a), pushes cos(a).
    Cos,
    /// Pops top value (a), pushes exp(a).
    Exp,
    /// Pops top value (a), pushes ln(a).
    Ln,
    /// Pops top value (a), pushes -a.
    Neg,
}

/// Represents a compiled sequence of operations.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Bytecode {
    pub ops: Vec<OpCode>,
}

impl Bytecode {
    pub fn new() -> Self {
        Self { ops: Vec::new() }
    }
}

/// Stack-based Virtual Machine for evaluating compiled expressions.
///
/// The VM is stateless; `execute` takes all necessary context:
/// - `bytecode`: Instructions to run.
/// - `vars`: Input values (read-only).
/// - `params`: Parameter values (read-only).
/// - `stack`: A mutable buffer for intermediate computations.
pub struct VM;

fn pop<T: Scalar>(stack: &mut Vec<T>) -> T {
    // Compiled programs are balanced; an empty stack only arises from
    // hand-built bytecode and evaluates to NaN.
    stack.pop().unwrap_or_else(T::nan)
}

impl VM {
    pub fn execute<T: Scalar>(
        bytecode: &Bytecode,
        vars: &[T],
        params: &[T],
        stack: &mut Vec<T>,
    ) -> T {
        stack.clear();

        for op in &bytecode.ops {
            match *op {
                OpCode::LoadConst(val) => {
                    stack.push(T::from_f64(val).unwrap_or_else(T::nan));
                }
                OpCode::LoadVar(idx) => {
                    stack.push(vars.get(idx).copied().unwrap_or_else(T::nan));
                }
                OpCode::LoadParam(idx) => {
                    stack.push(params.get(idx).copied().unwrap_or_else(T::nan));
                }
                OpCode::Add | OpCode::Sub | OpCode::Mul | OpCode::Div | OpCode::Pow => {
                    let b = pop(stack);
                    let a = pop(stack);
                    stack.push(match *op {
                        OpCode::Add => a + b,
                        OpCode::Sub => a - b,
                        OpCode::Mul => a * b,
                        OpCode::Div => a / b,
                        _ => a.powf(b),
                    });
                }
                OpCode::Powi(n) => {
                    let a = pop(stack);
                    stack.push(a.powi(n));
                }
                OpCode::Sqrt => {
                    let a = pop(stack);
                    stack.push(a.sqrt());
                }
                OpCode::Sin => {
                    let a = pop(stack);
                    stack.push(a.sin());
                }
                OpCode::Cos => {
                    let a = pop(stack);
                    stack.push(a.cos());
                }
                OpCode::Exp => {
                    let a = pop(stack);
                    stack.push(a.exp());
                }
                OpCode::Ln => {
                    let a = pop(stack);
                    stack.push(a.ln());
                }
                OpCode::Neg => {
                    let a = pop(stack);
                    stack.push(-a);
                }
            }
        }

        pop(stack)
    }
}

/// Compiles a symbolic `Expr` into `Bytecode`.
/// Input atoms (symbols or coordinates) resolve to variable slots first, then
/// to parameter slots.
pub struct Compiler {
    pub vars: Vec<Expr>,
    pub params: Vec<Expr>,
}

impl Compiler {
    pub fn new(vars: &[Expr], params: &[Expr]) -> Self {
        Self {
            vars: vars.to_vec(),
            params: params.to_vec(),
        }
    }

    pub fn compile(&self, expr: &Expr) -> SymbolicResult<Bytecode> {
        let mut ops = Vec::new();
        self.compile_recursive(expr, &mut ops)?;
        Ok(Bytecode { ops })
    }

    fn compile_recursive(&self, expr: &Expr, ops: &mut Vec<OpCode>) -> SymbolicResult<()> {
        if let Some(idx) = self.vars.iter().position(|v| v == expr) {
            ops.push(OpCode::LoadVar(idx));
            return Ok(());
        }
        if let Some(idx) = self.params.iter().position(|p| p == expr) {
            ops.push(OpCode::LoadParam(idx));
            return Ok(());
        }
        match expr {
            Expr::Number(n) => ops.push(OpCode::LoadConst(*n)),
            Expr::Pi => ops.push(OpCode::LoadConst(PI)),
            Expr::ImaginaryUnit => {
                return Err(SymbolicError::ComplexValued(expr.to_string()));
            }
            Expr::Symbol(s) => return Err(SymbolicError::UnknownSymbol(s.to_string())),
            Expr::Coordinate(c) => return Err(SymbolicError::UnknownSymbol(c.to_string())),
            Expr::Sum(terms) => {
                for (i, term) in terms.iter().enumerate() {
                    let negative = i > 0 && term.split_coefficient().0 < 0.0;
                    if negative {
                        self.compile_recursive(&(-term).simplify_coefficient(), ops)?;
                        ops.push(OpCode::Sub);
                    } else {
                        self.compile_recursive(term, ops)?;
                        if i > 0 {
                            ops.push(OpCode::Add);
                        }
                    }
                }
            }
            Expr::Product(factors) => {
                for (i, factor) in factors.iter().enumerate() {
                    match factor {
                        Expr::Pow(base, exponent) if exponent.as_number() == Some(-1.0) && i > 0 => {
                            self.compile_recursive(base, ops)?;
                            ops.push(OpCode::Div);
                        }
                        _ => {
                            self.compile_recursive(factor, ops)?;
                            if i > 0 {
                                ops.push(OpCode::Mul);
                            }
                        }
                    }
                }
            }
            Expr::Pow(base, exponent) => {
                self.compile_recursive(base, ops)?;
                match exponent.as_number() {
                    Some(e) if e == 0.5 => ops.push(OpCode::Sqrt),
                    Some(e) if e.fract() == 0.0 && e.abs() <= 64.0 => ops.push(OpCode::Powi(e as i32)),
                    _ => {
                        self.compile_recursive(exponent, ops)?;
                        ops.push(OpCode::Pow);
                    }
                }
            }
            Expr::Function(func, arg) => {
                self.compile_recursive(arg, ops)?;
                ops.push(match func {
                    Func::Sin => OpCode::Sin,
                    Func::Cos => OpCode::Cos,
                    Func::Exp => OpCode::Exp,
                    Func::Ln => OpCode::Ln,
                });
            }
        }
        Ok(())
    }
}

/// A symbolic expression compiled into a callable of its input atoms.
#[derive(Debug, Clone)]
pub struct CompiledFunction {
    pub bytecode: Bytecode,
    pub arity: usize,
    stack: RefCell<Vec<f64>>,
}

impl CompiledFunction {
    pub fn call(&self, args: &[f64]) -> f64 {
        let mut stack = self.stack.borrow_mut();
        VM::execute(&self.bytecode, args, &[], &mut stack)
    }

    /// Evaluates a one-argument function at every sample.
    pub fn sample(&self, inputs: &[f64]) -> Vec<f64> {
        inputs.iter().map(|&x| self.call(&[x])).collect()
    }
}

/// Compiles `expr` into a numeric function of `vars`. Every atom of `expr`
/// must be one of `vars`.
pub fn lambdify(expr: &Expr, vars: &[Expr]) -> SymbolicResult<CompiledFunction> {
    let compiler = Compiler::new(vars, &[]);
    let bytecode = compiler.compile(expr)?;
    Ok(CompiledFunction {
        bytecode,
        arity: vars.len(),
        stack: RefCell::new(Vec::with_capacity(32)),
    })
}

// --- Infix parser ---

/// Maps identifiers in textual input to expressions.
#[derive(Debug, Clone, Default)]
pub struct SymbolTable {
    entries: HashMap<String, Expr>,
}

impl SymbolTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<Expr>) {
        self.entries.insert(name.into(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&Expr> {
        self.entries.get(name)
    }
}

/// Parses an infix expression. Identifiers resolve through `table`; `pi` is
/// built in, as are `sin`, `cos`, `exp`, `log`/`ln` and `sqrt`.
pub fn parse(input: &str, table: &SymbolTable) -> SymbolicResult<Expr> {
    let tokens = tokenize(input)?;
    let mut parser = Parser {
        tokens,
        pos: 0,
        table,
    };
    let expr = parser.parse_expression()?;
    if parser.pos < parser.tokens.len() {
        return Err(parser.error("Unexpected trailing input"));
    }
    Ok(expr)
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Number(f64),
    Identifier(String),
    Plus,
    Minus,
    Star,
    Slash,
    Caret,
    LParen,
    RParen,
}

fn tokenize(input: &str) -> SymbolicResult<Vec<Token>> {
    let mut tokens = Vec::new();
    let mut chars = input.chars().peekable();

    while let Some(&c) = chars.peek() {
        if c.is_whitespace() {
            chars.next();
        } else if c.is_ascii_digit() || c == '.' {
            let mut num_str = String::new();
            while let Some(&d) = chars.peek() {
                let exponent_sign = (d == '-' || d == '+') && num_str.ends_with(['e', 'E']);
                if d.is_ascii_digit() || d == '.' || d == 'e' || d == 'E' || exponent_sign {
                    num_str.push(d);
                    chars.next();
                } else {
                    break;
                }
            }
            let value = num_str.parse().map_err(|_| SymbolicError::Parse {
                position: tokens.len(),
                message: format!("Invalid number '{}'", num_str),
            })?;
            tokens.push(Token::Number(value));
        } else if c.is_alphabetic() || c == '_' {
            let mut ident = String::new();
            while let Some(&d) = chars.peek() {
                if d.is_alphanumeric() || d == '_' {
                    ident.push(d);
                    chars.next();
                } else {
                    break;
                }
            }
            tokens.push(Token::Identifier(ident));
        } else {
            let token = match c {
                '+' => Token::Plus,
                '-' => Token::Minus,
                '*' => Token::Star,
                '/' => Token::Slash,
                '^' => Token::Caret,
                '(' => Token::LParen,
                ')' => Token::RParen,
                other => {
                    return Err(SymbolicError::Parse {
                        position: tokens.len(),
                        message: format!("Unexpected character '{}'", other),
                    })
                }
            };
            tokens.push(token);
            chars.next();
        }
    }
    Ok(tokens)
}

struct Parser<'a> {
    tokens: Vec<Token>,
    pos: usize,
    table: &'a SymbolTable,
}

impl<'a> Parser<'a> {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn consume(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn error(&self, message: &str) -> SymbolicError {
        SymbolicError::Parse {
            position: self.pos,
            message: message.to_string(),
        }
    }

    fn expect_rparen(&mut self) -> SymbolicResult<()> {
        match self.consume() {
            Some(Token::RParen) => Ok(()),
            _ => Err(self.error("Expected ')'")),
        }
    }

    // expression := term (('+' | '-') term)*
    fn parse_expression(&mut self) -> SymbolicResult<Expr> {
        let mut left = self.parse_term()?;
        loop {
            match self.peek() {
                Some(Token::Plus) => {
                    self.consume();
                    left = left + self.parse_term()?;
                }
                Some(Token::Minus) => {
                    self.consume();
                    left = left - self.parse_term()?;
                }
                _ => return Ok(left),
            }
        }
    }

    // term := unary (('*' | '/') unary)*
    fn parse_term(&mut self) -> SymbolicResult<Expr> {
        let mut left = self.parse_unary()?;
        loop {
            match self.peek() {
                Some(Token::Star) => {
                    self.consume();
                    left = left * self.parse_unary()?;
                }
                Some(Token::Slash) => {
                    self.consume();
                    left = left / self.parse_unary()?;
                }
                _ => return Ok(left),
            }
        }
    }

    // unary := '-' unary | power
    fn parse_unary(&mut self) -> SymbolicResult<Expr> {
        if let Some(Token::Minus) = self.peek() {
            self.consume();
            return Ok(-self.parse_unary()?);
        }
        if let Some(Token::Plus) = self.peek() {
            self.consume();
            return self.parse_unary();
        }
        self.parse_power()
    }

    // power := primary ('^' unary)?   (right associative)
    fn parse_power(&mut self) -> SymbolicResult<Expr> {
        let base = self.parse_primary()?;
        if let Some(Token::Caret) = self.peek() {
            self.consume();
            let exponent = self.parse_unary()?;
            return Ok(Expr::pow(base, exponent));
        }
        Ok(base)
    }

    fn parse_primary(&mut self) -> SymbolicResult<Expr> {
        match self.consume() {
            Some(Token::Number(n)) => Ok(Expr::Number(n)),
            Some(Token::Identifier(name)) => {
                if let Some(Token::LParen) = self.peek() {
                    self.consume();
                    let arg = self.parse_expression()?;
                    self.expect_rparen()?;
                    return match name.as_str() {
                        "sin" => Ok(Expr::sin(arg)),
                        "cos" => Ok(Expr::cos(arg)),
                        "exp" => Ok(Expr::exp(arg)),
                        "log" | "ln" => Ok(Expr::ln(arg)),
                        "sqrt" => Ok(Expr::sqrt(arg)),
                        _ => Err(SymbolicError::UnknownSymbol(name)),
                    };
                }
                if let Some(value) = self.table.get(&name) {
                    return Ok(value.clone());
                }
                match name.as_str() {
                    "pi" => Ok(Expr::Pi),
                    _ => Err(SymbolicError::UnknownSymbol(name)),
                }
            }
            Some(Token::LParen) => {
                let expr = self.parse_expression()?;
                self.expect_rparen()?;
                Ok(expr)
            }
            _ => Err(self.error("Unexpected token")),
        }
    }
}

// --- EquationSystem ---

/// A concrete implementation of `DynamicalSystem` that uses the VM.
/// Contains one compiled bytecode expression per state variable.
pub struct EquationSystem<T: Scalar = f64> {
    pub equations: Vec<Bytecode>,
    pub params: Vec<T>,
    // Interior mutability for VM stack to avoid allocation in apply.
    pub stack: RefCell<Vec<T>>,
}

impl<T: Scalar> EquationSystem<T> {
    pub fn new(equations: Vec<Bytecode>, params: Vec<T>) -> Self {
        Self {
            equations,
            params,
            stack: RefCell::new(Vec::with_capacity(64)),
        }
    }
}

impl EquationSystem<f64> {
    /// Compiles one right-hand side per state variable. `state` fixes the
    /// variable slots.
    pub fn compile(
        fields: &[Expr],
        state: &[Expr],
        params: &[(Expr, f64)],
    ) -> SymbolicResult<Self> {
        if fields.len() != state.len() {
            return Err(SymbolicError::DimensionMismatch {
                expected: state.len(),
                got: fields.len(),
            });
        }
        let param_atoms: Vec<Expr> = params.iter().map(|(atom, _)| atom.clone()).collect();
        let compiler = Compiler::new(state, &param_atoms);
        let equations = fields
            .iter()
            .map(|field| compiler.compile(field))
            .collect::<SymbolicResult<Vec<_>>>()?;
        Ok(Self::new(equations, params.iter().map(|(_, v)| *v).collect()))
    }
}

impl<T: Scalar> DynamicalSystem<T> for EquationSystem<T> {
    fn dimension(&self) -> usize {
        self.equations.len()
    }

    fn apply(&self, _t: T, x: &[T], out: &mut [T]) {
        let mut stack = self.stack.borrow_mut();
        for (i, eq) in self.equations.iter().enumerate() {
            out[i] = VM::execute(eq, x, &self.params, &mut stack);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::symbol::Symbol;

    fn table() -> (SymbolTable, Expr, Expr) {
        let theta = Expr::from(Symbol::real("theta"));
        let g = Expr::from(Symbol::positive("g"));
        let mut table = SymbolTable::new();
        table.insert("theta", theta.clone());
        table.insert("g", g.clone());
        (table, theta, g)
    }

    #[test]
    fn parses_precedence_and_unary_minus() {
        let (table, theta, g) = table();
        let parsed = parse("-g*sin(theta)^2 + 1", &table).expect("parses");
        let expected = -g * Expr::powf(Expr::sin(theta), 2.0) + 1.0;
        assert_eq!(parsed.simplify(), expected.simplify());
    }

    #[test]
    fn power_is_right_associative() {
        let (table, theta, _) = table();
        let parsed = parse("theta^2^3", &table).expect("parses");
        assert_eq!(parsed.simplify(), Expr::powf(theta, 8.0));
    }

    #[test]
    fn parse_errors_are_reported() {
        let (table, _, _) = table();
        assert!(matches!(parse("sin(theta", &table), Err(SymbolicError::Parse { .. })));
        assert_eq!(
            parse("unknown + 1", &table),
            Err(SymbolicError::UnknownSymbol("unknown".to_string()))
        );
        assert!(matches!(parse("theta $ 2", &table), Err(SymbolicError::Parse { .. })));
    }

    #[test]
    fn lambdify_matches_direct_evaluation() {
        let (table, theta, g) = table();
        let e = parse("-g/2*sin(theta) + sqrt(g) - theta^3", &table).expect("parses").simplify();
        let f = lambdify(&e, &[theta.clone(), g.clone()]).expect("compiles");
        for &(th, gv) in &[(0.3, 9.81), (-1.2, 2.0), (2.5, 0.5)] {
            let expected = e.eval_real(&[(theta.clone(), th), (g.clone(), gv)]).expect("evaluates");
            assert!((f.call(&[th, gv]) - expected).abs() < 1e-12);
        }
    }

    #[test]
    fn lambdify_rejects_unbound_atoms() {
        let (_, theta, g) = table();
        let e = theta.clone() * g;
        assert!(matches!(lambdify(&e, &[theta]), Err(SymbolicError::UnknownSymbol(_))));
    }

    #[test]
    fn equation_system_binds_parameters() {
        let (_, theta, g) = table();
        let omega = Expr::from(Symbol::real("omega"));
        let fields = vec![omega.clone(), (-g.clone() * Expr::sin(theta.clone())).simplify()];
        let system = EquationSystem::compile(&fields, &[theta, omega], &[(g, 2.0)])
            .expect("compiles");
        let mut out = [0.0; 2];
        system.apply(0.0, &[std::f64::consts::FRAC_PI_2, 0.5], &mut out);
        assert!((out[0] - 0.5).abs() < 1e-12);
        assert!((out[1] + 2.0).abs() < 1e-12);
    }
}

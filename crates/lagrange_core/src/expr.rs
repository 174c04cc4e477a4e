use crate::symbol::{Coordinate, Symbol};
use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::fmt;
use std::ops::{Add, Div, Mul, Neg, Sub};

/// Elementary functions understood by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Func {
    Sin,
    Cos,
    Exp,
    Ln,
}

impl Func {
    pub fn name(self) -> &'static str {
        match self {
            Func::Sin => "sin",
            Func::Cos => "cos",
            Func::Exp => "exp",
            Func::Ln => "log",
        }
    }

    pub fn apply_f64(self, x: f64) -> f64 {
        match self {
            Func::Sin => x.sin(),
            Func::Cos => x.cos(),
            Func::Exp => x.exp(),
            Func::Ln => x.ln(),
        }
    }
}

/// Symbolic expression tree.
///
/// Sums and products are n-ary. Subtraction is `a + (-1)*b` and division is
/// `a * b^-1`, so the simplifier only deals with four composite shapes.
/// Constructors flatten but never simplify; call [`Expr::simplify`] for the
/// canonical form.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Number(f64),
    Pi,
    ImaginaryUnit,
    Symbol(Symbol),
    Coordinate(Coordinate),
    Sum(Vec<Expr>),
    Product(Vec<Expr>),
    Pow(Box<Expr>, Box<Expr>),
    Function(Func, Box<Expr>),
}

impl Expr {
    pub fn num(value: f64) -> Self {
        Expr::Number(value)
    }

    pub fn zero() -> Self {
        Expr::Number(0.0)
    }

    pub fn one() -> Self {
        Expr::Number(1.0)
    }

    pub fn pow(base: Expr, exponent: Expr) -> Self {
        Expr::Pow(Box::new(base), Box::new(exponent))
    }

    pub fn powf(base: Expr, exponent: f64) -> Self {
        Expr::pow(base, Expr::Number(exponent))
    }

    pub fn sqrt(arg: Expr) -> Self {
        Expr::powf(arg, 0.5)
    }

    pub fn sin(arg: Expr) -> Self {
        Expr::Function(Func::Sin, Box::new(arg))
    }

    pub fn cos(arg: Expr) -> Self {
        Expr::Function(Func::Cos, Box::new(arg))
    }

    pub fn exp(arg: Expr) -> Self {
        Expr::Function(Func::Exp, Box::new(arg))
    }

    pub fn ln(arg: Expr) -> Self {
        Expr::Function(Func::Ln, Box::new(arg))
    }

    pub fn sum(terms: Vec<Expr>) -> Self {
        let mut flat = Vec::with_capacity(terms.len());
        for term in terms {
            match term {
                Expr::Sum(inner) => flat.extend(inner),
                other => flat.push(other),
            }
        }
        match flat.len() {
            0 => Expr::zero(),
            1 => flat.remove(0),
            _ => Expr::Sum(flat),
        }
    }

    pub fn product(factors: Vec<Expr>) -> Self {
        let mut flat = Vec::with_capacity(factors.len());
        for factor in factors {
            match factor {
                Expr::Product(inner) => flat.extend(inner),
                other => flat.push(other),
            }
        }
        match flat.len() {
            0 => Expr::one(),
            1 => flat.remove(0),
            _ => Expr::Product(flat),
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Expr::Number(value) => Some(*value),
            _ => None,
        }
    }

    pub fn is_zero(&self) -> bool {
        matches!(self, Expr::Number(v) if *v == 0.0)
    }

    pub fn is_one(&self) -> bool {
        matches!(self, Expr::Number(v) if *v == 1.0)
    }

    pub fn is_atom(&self) -> bool {
        matches!(
            self,
            Expr::Number(_) | Expr::Pi | Expr::ImaginaryUnit | Expr::Symbol(_) | Expr::Coordinate(_)
        )
    }

    pub fn children(&self) -> Vec<&Expr> {
        match self {
            Expr::Sum(items) | Expr::Product(items) => items.iter().collect(),
            Expr::Pow(base, exponent) => vec![base.as_ref(), exponent.as_ref()],
            Expr::Function(_, arg) => vec![arg.as_ref()],
            _ => Vec::new(),
        }
    }

    /// True when `atom` occurs anywhere in the tree.
    pub fn depends_on(&self, atom: &Expr) -> bool {
        self == atom || self.children().into_iter().any(|c| c.depends_on(atom))
    }

    pub fn depends_on_any(&self, atoms: &[Expr]) -> bool {
        atoms.iter().any(|atom| self.depends_on(atom))
    }

    pub fn free_symbols(&self) -> BTreeSet<Symbol> {
        let mut out = BTreeSet::new();
        self.collect_symbols(&mut out);
        out
    }

    fn collect_symbols(&self, out: &mut BTreeSet<Symbol>) {
        match self {
            Expr::Symbol(s) => {
                out.insert(s.clone());
            }
            Expr::Coordinate(c) => {
                out.insert(c.time().clone());
            }
            _ => {
                for child in self.children() {
                    child.collect_symbols(out);
                }
            }
        }
    }

    pub fn coordinates(&self) -> BTreeSet<Coordinate> {
        let mut out = BTreeSet::new();
        self.collect_coordinates(&mut out);
        out
    }

    fn collect_coordinates(&self, out: &mut BTreeSet<Coordinate>) {
        if let Expr::Coordinate(c) = self {
            out.insert(c.clone());
        }
        for child in self.children() {
            child.collect_coordinates(out);
        }
    }

    pub fn subs(&self, target: &Expr, replacement: &Expr) -> Expr {
        self.subs_all(&[(target.clone(), replacement.clone())])
    }

    /// Simultaneous substitution; replacements are not themselves rewritten.
    pub fn subs_all(&self, pairs: &[(Expr, Expr)]) -> Expr {
        if let Some((_, replacement)) = pairs.iter().find(|(target, _)| target == self) {
            return replacement.clone();
        }
        match self {
            Expr::Sum(terms) => Expr::Sum(terms.iter().map(|t| t.subs_all(pairs)).collect()),
            Expr::Product(factors) => {
                Expr::Product(factors.iter().map(|f| f.subs_all(pairs)).collect())
            }
            Expr::Pow(base, exponent) => Expr::pow(base.subs_all(pairs), exponent.subs_all(pairs)),
            Expr::Function(func, arg) => Expr::Function(*func, Box::new(arg.subs_all(pairs))),
            atom => atom.clone(),
        }
    }

    /// Splits a leading numeric coefficient: `3*x*y -> (3, x*y)`.
    pub fn split_coefficient(&self) -> (f64, Expr) {
        match self {
            Expr::Number(v) => (*v, Expr::one()),
            Expr::Product(factors) => {
                let mut coeff = 1.0;
                let mut rest = Vec::with_capacity(factors.len());
                for factor in factors {
                    match factor {
                        Expr::Number(v) => coeff *= v,
                        other => rest.push(other.clone()),
                    }
                }
                (coeff, Expr::product(rest))
            }
            other => (1.0, other.clone()),
        }
    }

    /// Splits `base^exponent`; anything else has exponent one.
    pub fn as_base_exponent(&self) -> (Expr, Expr) {
        match self {
            Expr::Pow(base, exponent) => (base.as_ref().clone(), exponent.as_ref().clone()),
            other => (other.clone(), Expr::one()),
        }
    }

    fn rank(&self) -> u8 {
        match self {
            Expr::Number(_) => 0,
            Expr::Pi => 1,
            Expr::ImaginaryUnit => 2,
            Expr::Symbol(_) => 3,
            Expr::Coordinate(_) => 4,
            Expr::Function(_, _) => 5,
            Expr::Pow(_, _) => 6,
            Expr::Product(_) => 7,
            Expr::Sum(_) => 8,
        }
    }

    /// Total order used to sort terms and factors into canonical position.
    pub fn canonical_cmp(&self, other: &Expr) -> Ordering {
        self.rank().cmp(&other.rank()).then_with(|| match (self, other) {
            (Expr::Number(a), Expr::Number(b)) => a.total_cmp(b),
            (Expr::Symbol(a), Expr::Symbol(b)) => a.cmp(b),
            (Expr::Coordinate(a), Expr::Coordinate(b)) => a.cmp(b),
            (Expr::Function(fa, a), Expr::Function(fb, b)) => {
                fa.cmp(fb).then_with(|| a.canonical_cmp(b))
            }
            (Expr::Pow(ba, ea), Expr::Pow(bb, eb)) => {
                ba.canonical_cmp(bb).then_with(|| ea.canonical_cmp(eb))
            }
            (Expr::Sum(a), Expr::Sum(b)) | (Expr::Product(a), Expr::Product(b)) => {
                cmp_slices(a, b)
            }
            _ => Ordering::Equal,
        })
    }
}

fn cmp_slices(a: &[Expr], b: &[Expr]) -> Ordering {
    for (x, y) in a.iter().zip(b.iter()) {
        let ord = x.canonical_cmp(y);
        if ord != Ordering::Equal {
            return ord;
        }
    }
    a.len().cmp(&b.len())
}

impl From<f64> for Expr {
    fn from(value: f64) -> Self {
        Expr::Number(value)
    }
}

impl From<Symbol> for Expr {
    fn from(symbol: Symbol) -> Self {
        Expr::Symbol(symbol)
    }
}

impl From<&Symbol> for Expr {
    fn from(symbol: &Symbol) -> Self {
        Expr::Symbol(symbol.clone())
    }
}

impl From<Coordinate> for Expr {
    fn from(coordinate: Coordinate) -> Self {
        Expr::Coordinate(coordinate)
    }
}

impl From<&Coordinate> for Expr {
    fn from(coordinate: &Coordinate) -> Self {
        Expr::Coordinate(coordinate.clone())
    }
}

fn add_exprs(a: Expr, b: Expr) -> Expr {
    Expr::sum(vec![a, b])
}

fn sub_exprs(a: Expr, b: Expr) -> Expr {
    Expr::sum(vec![a, neg_expr(b)])
}

fn mul_exprs(a: Expr, b: Expr) -> Expr {
    Expr::product(vec![a, b])
}

fn div_exprs(a: Expr, b: Expr) -> Expr {
    Expr::product(vec![a, Expr::powf(b, -1.0)])
}

fn neg_expr(a: Expr) -> Expr {
    match a {
        Expr::Number(v) => Expr::Number(-v),
        other => Expr::product(vec![Expr::Number(-1.0), other]),
    }
}

macro_rules! impl_binary_op {
    ($trait:ident, $method:ident, $func:ident) => {
        impl $trait<Expr> for Expr {
            type Output = Expr;
            fn $method(self, rhs: Expr) -> Expr {
                $func(self, rhs)
            }
        }

        impl $trait<&Expr> for Expr {
            type Output = Expr;
            fn $method(self, rhs: &Expr) -> Expr {
                $func(self, rhs.clone())
            }
        }

        impl $trait<Expr> for &Expr {
            type Output = Expr;
            fn $method(self, rhs: Expr) -> Expr {
                $func(self.clone(), rhs)
            }
        }

        impl $trait<&Expr> for &Expr {
            type Output = Expr;
            fn $method(self, rhs: &Expr) -> Expr {
                $func(self.clone(), rhs.clone())
            }
        }

        impl $trait<f64> for Expr {
            type Output = Expr;
            fn $method(self, rhs: f64) -> Expr {
                $func(self, Expr::Number(rhs))
            }
        }

        impl $trait<Expr> for f64 {
            type Output = Expr;
            fn $method(self, rhs: Expr) -> Expr {
                $func(Expr::Number(self), rhs)
            }
        }
    };
}

impl_binary_op!(Add, add, add_exprs);
impl_binary_op!(Sub, sub, sub_exprs);
impl_binary_op!(Mul, mul, mul_exprs);
impl_binary_op!(Div, div, div_exprs);

impl Neg for Expr {
    type Output = Expr;
    fn neg(self) -> Expr {
        neg_expr(self)
    }
}

impl Neg for &Expr {
    type Output = Expr;
    fn neg(self) -> Expr {
        neg_expr(self.clone())
    }
}

/// An equation `lhs = rhs`.
#[derive(Debug, Clone, PartialEq)]
pub struct Equation {
    pub lhs: Expr,
    pub rhs: Expr,
}

impl Equation {
    pub fn new(lhs: Expr, rhs: Expr) -> Self {
        Self { lhs, rhs }
    }

    /// `lhs - rhs`, the form solvers work with.
    pub fn residual(&self) -> Expr {
        &self.lhs - &self.rhs
    }
}

impl fmt::Display for Equation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Eq({}, {})", self.lhs, self.rhs)
    }
}

// --- Plain-text printer ---

const PREC_SUM: u8 = 1;
const PREC_PRODUCT: u8 = 2;
const PREC_POW: u8 = 3;
const PREC_ATOM: u8 = 4;

pub(crate) fn format_number(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        format!("{}", value)
    }
}

/// Whether a term prints with a leading minus sign.
pub(crate) fn is_negative_term(expr: &Expr) -> bool {
    match expr {
        Expr::Number(v) => *v < 0.0,
        Expr::Product(_) => expr.split_coefficient().0 < 0.0,
        _ => false,
    }
}

/// Product factors split into numerator and denominator (positive exponents).
pub(crate) struct Fraction {
    pub coeff: f64,
    pub numerator: Vec<Expr>,
    pub denominator: Vec<Expr>,
}

pub(crate) fn as_fraction(expr: &Expr) -> Fraction {
    let (coeff, rest) = expr.split_coefficient();
    let factors = match rest {
        Expr::Product(items) => items,
        Expr::Number(_) => Vec::new(),
        other => vec![other],
    };
    let mut numerator = Vec::new();
    let mut denominator = Vec::new();
    for factor in factors {
        match &factor {
            Expr::Pow(base, exponent) => match exponent.as_number() {
                Some(e) if e < 0.0 => {
                    if e == -1.0 {
                        denominator.push(base.as_ref().clone());
                    } else {
                        denominator.push(Expr::powf(base.as_ref().clone(), -e));
                    }
                }
                _ => numerator.push(factor.clone()),
            },
            _ => numerator.push(factor.clone()),
        }
    }
    Fraction {
        coeff,
        numerator,
        denominator,
    }
}

fn precedence(expr: &Expr) -> u8 {
    match expr {
        Expr::Sum(_) => PREC_SUM,
        Expr::Product(_) => PREC_PRODUCT,
        Expr::Number(v) if *v < 0.0 => PREC_PRODUCT,
        Expr::Pow(_, exponent) if exponent.as_number() == Some(0.5) => PREC_ATOM,
        Expr::Pow(_, _) => PREC_POW,
        _ => PREC_ATOM,
    }
}

fn write_expr(f: &mut fmt::Formatter<'_>, expr: &Expr, min_prec: u8) -> fmt::Result {
    if precedence(expr) < min_prec {
        f.write_str("(")?;
        write_bare(f, expr)?;
        return f.write_str(")");
    }
    write_bare(f, expr)
}

fn write_bare(f: &mut fmt::Formatter<'_>, expr: &Expr) -> fmt::Result {
    match expr {
        Expr::Number(v) => f.write_str(&format_number(*v)),
        Expr::Pi => f.write_str("pi"),
        Expr::ImaginaryUnit => f.write_str("I"),
        Expr::Symbol(s) => write!(f, "{}", s),
        Expr::Coordinate(c) => write!(f, "{}", c),
        Expr::Function(func, arg) => {
            write!(f, "{}(", func.name())?;
            write_bare(f, arg)?;
            f.write_str(")")
        }
        Expr::Pow(base, exponent) => {
            if exponent.as_number() == Some(0.5) {
                f.write_str("sqrt(")?;
                write_bare(f, base)?;
                return f.write_str(")");
            }
            if exponent.as_number().map_or(false, |e| e < 0.0) {
                return write_product(f, expr);
            }
            write_expr(f, base, PREC_ATOM)?;
            f.write_str("^")?;
            write_expr(f, exponent, PREC_ATOM)
        }
        Expr::Product(_) => write_product(f, expr),
        Expr::Sum(terms) => {
            for (i, term) in terms.iter().enumerate() {
                if i == 0 {
                    write_expr(f, term, PREC_SUM + 1)?;
                } else if is_negative_term(term) {
                    f.write_str(" - ")?;
                    write_expr(f, &(-term).simplify_coefficient(), PREC_SUM + 1)?;
                } else {
                    f.write_str(" + ")?;
                    write_expr(f, term, PREC_SUM + 1)?;
                }
            }
            Ok(())
        }
    }
}

fn write_product(f: &mut fmt::Formatter<'_>, expr: &Expr) -> fmt::Result {
    let fraction = as_fraction(expr);
    let mut coeff = fraction.coeff;
    if coeff < 0.0 {
        f.write_str("-")?;
        coeff = -coeff;
    }
    let mut wrote = false;
    if coeff != 1.0 || fraction.numerator.is_empty() {
        f.write_str(&format_number(coeff))?;
        wrote = true;
    }
    for factor in &fraction.numerator {
        if wrote {
            f.write_str("*")?;
        }
        write_expr(f, factor, PREC_POW)?;
        wrote = true;
    }
    if !fraction.denominator.is_empty() {
        f.write_str("/")?;
        if fraction.denominator.len() == 1 {
            write_expr(f, &fraction.denominator[0], PREC_POW)?;
        } else {
            f.write_str("(")?;
            for (i, factor) in fraction.denominator.iter().enumerate() {
                if i > 0 {
                    f.write_str("*")?;
                }
                write_expr(f, factor, PREC_POW)?;
            }
            f.write_str(")")?;
        }
    }
    Ok(())
}

impl Expr {
    /// Folds the numeric factors of a product into one leading coefficient.
    /// Used by the printers after negating a term.
    pub(crate) fn simplify_coefficient(&self) -> Expr {
        let (coeff, rest) = self.split_coefficient();
        if coeff == 1.0 {
            return rest;
        }
        if rest.is_one() {
            return Expr::Number(coeff);
        }
        Expr::product(vec![Expr::Number(coeff), rest])
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_bare(f, self)
    }
}

//! LaTeX rendering for expressions, equations and matrices.

use crate::expr::{as_fraction, format_number, is_negative_term, Equation, Expr};
use crate::matrix::Matrix;
use crate::symbol::Coordinate;

const GREEK: &[&str] = &[
    "alpha", "beta", "gamma", "delta", "epsilon", "zeta", "eta", "theta", "iota", "kappa",
    "lambda", "mu", "nu", "xi", "pi", "rho", "sigma", "tau", "upsilon", "phi", "chi", "psi",
    "omega",
];

/// `theta -> \theta`, `x1 -> x_{1}`, `omega2 -> \omega_{2}`.
pub fn latex_name(name: &str) -> String {
    let split = name
        .char_indices()
        .find(|(_, c)| c.is_ascii_digit())
        .map(|(i, _)| i)
        .unwrap_or(name.len());
    let (stem, digits) = name.split_at(split);
    let stem = if GREEK.contains(&stem) {
        format!("\\{}", stem)
    } else {
        stem.to_string()
    };
    if digits.is_empty() {
        stem
    } else {
        format!("{}_{{{}}}", stem, digits)
    }
}

fn latex_coordinate(c: &Coordinate) -> String {
    let t = latex_name(c.time().name());
    let function = format!("{}{{\\left({} \\right)}}", latex_name(c.name()), t);
    match c.order() {
        0 => function,
        1 => format!("\\frac{{d}}{{d {}}} {}", t, function),
        n => format!("\\frac{{d^{{{n}}}}}{{d {t}^{{{n}}}}} {function}", n = n, t = t, function = function),
    }
}

pub trait ToLatex {
    fn to_latex(&self) -> String;
}

impl ToLatex for Expr {
    fn to_latex(&self) -> String {
        render(self)
    }
}

impl ToLatex for Equation {
    fn to_latex(&self) -> String {
        format!("{} = {}", render(&self.lhs), render(&self.rhs))
    }
}

impl ToLatex for Matrix {
    fn to_latex(&self) -> String {
        let rows: Vec<String> = (0..self.rows())
            .map(|i| {
                (0..self.cols())
                    .map(|j| render(self.get(i, j)))
                    .collect::<Vec<_>>()
                    .join(" & ")
            })
            .collect();
        format!(
            "\\left[\\begin{{matrix}}{}\\end{{matrix}}\\right]",
            rows.join("\\\\")
        )
    }
}

fn needs_parens_in_product(expr: &Expr) -> bool {
    matches!(expr, Expr::Sum(_))
}

fn render_factor(expr: &Expr) -> String {
    if needs_parens_in_product(expr) {
        format!("\\left({}\\right)", render(expr))
    } else {
        render(expr)
    }
}

fn render_base(expr: &Expr) -> String {
    match expr {
        Expr::Symbol(_) | Expr::Pi | Expr::ImaginaryUnit => render(expr),
        Expr::Number(v) if *v >= 0.0 => render(expr),
        _ => format!("\\left({}\\right)", render(expr)),
    }
}

fn render_factors(factors: &[Expr]) -> String {
    factors.iter().map(render_factor).collect::<Vec<_>>().join(" ")
}

fn render_product(expr: &Expr) -> String {
    let fraction = as_fraction(expr);
    let mut coeff = fraction.coeff;
    let sign = if coeff < 0.0 {
        coeff = -coeff;
        "- "
    } else {
        ""
    };
    let mut numerator = Vec::new();
    if coeff != 1.0 || fraction.numerator.is_empty() {
        numerator.push(format_number(coeff));
    }
    if !fraction.numerator.is_empty() {
        numerator.push(render_factors(&fraction.numerator));
    }
    let numerator = numerator.join(" ");
    if fraction.denominator.is_empty() {
        return format!("{}{}", sign, numerator);
    }
    format!(
        "{}\\frac{{{}}}{{{}}}",
        sign,
        numerator,
        render_factors(&fraction.denominator)
    )
}

fn render(expr: &Expr) -> String {
    match expr {
        Expr::Number(v) => format_number(*v),
        Expr::Pi => "\\pi".to_string(),
        Expr::ImaginaryUnit => "i".to_string(),
        Expr::Symbol(s) => latex_name(s.name()),
        Expr::Coordinate(c) => latex_coordinate(c),
        Expr::Function(func, arg) => {
            format!("\\{}{{\\left({} \\right)}}", func.name(), render(arg))
        }
        Expr::Pow(base, exponent) => match exponent.as_number() {
            Some(e) if e == 0.5 => format!("\\sqrt{{{}}}", render(base)),
            Some(e) if e < 0.0 => render_product(expr),
            _ => {
                let base = match base.as_ref() {
                    Expr::Coordinate(c) if c.order() > 0 => format!("\\left({}\\right)", render(base)),
                    Expr::Coordinate(_) => render(base),
                    other => render_base(other),
                };
                format!("{}^{{{}}}", base, render(exponent))
            }
        },
        Expr::Product(_) => render_product(expr),
        Expr::Sum(terms) => {
            let mut out = String::new();
            for (i, term) in terms.iter().enumerate() {
                if i == 0 {
                    out.push_str(&render(term));
                } else if is_negative_term(term) {
                    out.push_str(" - ");
                    out.push_str(&render(&(-term).simplify_coefficient()));
                } else {
                    out.push_str(" + ");
                    out.push_str(&render(term));
                }
            }
            out
        }
    }
}

//! Canonicalizing simplifier.
//!
//! `simplify` flattens sums and products, folds numbers, collects like terms
//! and equal bases, and sorts operands into canonical order so that
//! structurally equal results compare equal with `==`. Rewrites that only hold
//! on part of the complex plane are gated on [`Expr::sign`], which reads the
//! domains declared on symbols.
//!
//! `expand` additionally distributes products over sums.

use crate::expr::{Expr, Func};

const MAX_PASSES: usize = 16;
const MAX_EXPAND_POWER: f64 = 6.0;

/// Sign of an expression as far as symbol domains can prove it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sign {
    Positive,
    Negative,
    Zero,
}

impl Sign {
    fn times(self, other: Sign) -> Sign {
        match (self, other) {
            (Sign::Zero, _) | (_, Sign::Zero) => Sign::Zero,
            (a, b) if a == b => Sign::Positive,
            _ => Sign::Negative,
        }
    }
}

fn is_integer(value: f64) -> bool {
    value.is_finite() && value.fract() == 0.0
}

impl Expr {
    pub fn simplify(&self) -> Expr {
        let mut current = self.clone();
        for _ in 0..MAX_PASSES {
            let next = simplify_node(&current);
            if next == current {
                return next;
            }
            current = next;
        }
        current
    }

    /// Distributes products (and small integer powers) over sums, then simplifies.
    pub fn expand(&self) -> Expr {
        let mut current = self.simplify();
        for _ in 0..MAX_PASSES {
            let next = expand_node(&current).simplify();
            if next == current {
                return next;
            }
            current = next;
        }
        current
    }

    /// Proven sign, or `None` when the domains do not decide it.
    pub fn sign(&self) -> Option<Sign> {
        match self {
            Expr::Number(v) if *v > 0.0 => Some(Sign::Positive),
            Expr::Number(v) if *v < 0.0 => Some(Sign::Negative),
            Expr::Number(v) if *v == 0.0 => Some(Sign::Zero),
            Expr::Number(_) => None,
            Expr::Pi => Some(Sign::Positive),
            Expr::Symbol(s) if s.is_positive() => Some(Sign::Positive),
            Expr::Product(factors) => factors
                .iter()
                .try_fold(Sign::Positive, |acc, f| f.sign().map(|s| acc.times(s))),
            Expr::Sum(terms) => {
                let mut signs = terms.iter().map(|t| t.sign());
                let first = signs.next()??;
                signs.try_fold(first, |acc, s| match (acc, s?) {
                    (a, Sign::Zero) => Some(a),
                    (Sign::Zero, b) => Some(b),
                    (a, b) if a == b => Some(a),
                    _ => None,
                })
            }
            Expr::Pow(base, exponent) => {
                let base_sign = base.sign()?;
                match (base_sign, exponent.as_number()) {
                    (Sign::Positive, _) if exponent.is_real() => Some(Sign::Positive),
                    (Sign::Negative, Some(e)) if is_integer(e) => {
                        if (e as i64) % 2 == 0 {
                            Some(Sign::Positive)
                        } else {
                            Some(Sign::Negative)
                        }
                    }
                    (Sign::Zero, Some(e)) if e > 0.0 => Some(Sign::Zero),
                    _ => None,
                }
            }
            Expr::Function(Func::Exp, arg) if arg.is_real() => Some(Sign::Positive),
            _ => None,
        }
    }

    pub fn is_positive(&self) -> bool {
        self.sign() == Some(Sign::Positive)
    }

    pub fn is_negative(&self) -> bool {
        self.sign() == Some(Sign::Negative)
    }

    /// Whether the expression is real-valued for every admissible binding.
    pub fn is_real(&self) -> bool {
        match self {
            Expr::Number(_) | Expr::Pi | Expr::Coordinate(_) => true,
            Expr::ImaginaryUnit => false,
            Expr::Symbol(s) => s.is_real(),
            Expr::Sum(items) | Expr::Product(items) => items.iter().all(|e| e.is_real()),
            Expr::Pow(base, exponent) => {
                base.is_real()
                    && exponent.is_real()
                    && (base.is_positive()
                        || exponent.as_number().map_or(false, is_integer))
            }
            Expr::Function(Func::Ln, arg) => arg.is_positive(),
            Expr::Function(_, arg) => arg.is_real(),
        }
    }
}

fn simplify_node(expr: &Expr) -> Expr {
    match expr {
        Expr::Number(v) if *v == 0.0 => Expr::zero(),
        Expr::Sum(terms) => simplify_sum(terms.iter().map(simplify_node).collect()),
        Expr::Product(factors) => simplify_product(factors.iter().map(simplify_node).collect()),
        Expr::Pow(base, exponent) => simplify_pow(simplify_node(base), simplify_node(exponent)),
        Expr::Function(func, arg) => simplify_function(*func, simplify_node(arg)),
        atom => atom.clone(),
    }
}

fn with_coefficient(coeff: f64, rest: Expr) -> Expr {
    if coeff == 1.0 {
        return rest;
    }
    if rest.is_one() {
        return Expr::Number(coeff);
    }
    match rest {
        Expr::Product(mut factors) => {
            factors.insert(0, Expr::Number(coeff));
            Expr::Product(factors)
        }
        other => Expr::Product(vec![Expr::Number(coeff), other]),
    }
}

fn simplify_sum(terms: Vec<Expr>) -> Expr {
    let mut constant = 0.0;
    let mut groups: Vec<(Expr, f64)> = Vec::new();
    let mut pending = terms;
    while let Some(term) = pending.pop() {
        match term {
            Expr::Sum(inner) => pending.extend(inner),
            Expr::Number(v) => constant += v,
            other => {
                let (coeff, rest) = other.split_coefficient();
                match groups.iter_mut().find(|(key, _)| *key == rest) {
                    Some((_, total)) => *total += coeff,
                    None => groups.push((rest, coeff)),
                }
            }
        }
    }

    groups.retain(|(_, coeff)| *coeff != 0.0);
    groups.sort_by(|(a, ca), (b, cb)| a.canonical_cmp(b).then_with(|| ca.total_cmp(cb)));

    let mut out: Vec<Expr> = Vec::with_capacity(groups.len() + 1);
    if constant != 0.0 {
        out.push(Expr::Number(constant));
    }
    out.extend(groups.into_iter().map(|(rest, coeff)| with_coefficient(coeff, rest)));
    match out.len() {
        0 => Expr::zero(),
        1 => out.remove(0),
        _ => Expr::Sum(out),
    }
}

fn simplify_product(factors: Vec<Expr>) -> Expr {
    let mut coeff = 1.0;
    let mut powers: Vec<(Expr, Vec<Expr>)> = Vec::new();
    let mut pending = factors;
    while let Some(factor) = pending.pop() {
        match factor {
            Expr::Product(inner) => pending.extend(inner),
            Expr::Number(v) => coeff *= v,
            other => {
                let (base, exponent) = other.as_base_exponent();
                match powers.iter_mut().find(|(key, _)| *key == base) {
                    Some((_, exponents)) => exponents.push(exponent),
                    None => powers.push((base, vec![exponent])),
                }
            }
        }
    }
    if coeff == 0.0 {
        return Expr::zero();
    }

    let mut rebuilt = Vec::with_capacity(powers.len());
    let mut regroup = false;
    for (base, exponents) in powers {
        let exponent = simplify_sum(exponents);
        let factor = simplify_pow(base, exponent);
        match factor {
            Expr::Number(v) => coeff *= v,
            Expr::Product(_) => {
                regroup = true;
                rebuilt.push(factor);
            }
            other => rebuilt.push(other),
        }
    }
    if regroup {
        rebuilt.push(Expr::Number(coeff));
        return simplify_product(rebuilt);
    }
    if coeff == 0.0 {
        return Expr::zero();
    }

    rebuilt.sort_by(|a, b| {
        let (ba, ea) = a.as_base_exponent();
        let (bb, eb) = b.as_base_exponent();
        ba.canonical_cmp(&bb).then_with(|| ea.canonical_cmp(&eb))
    });

    if rebuilt.len() == 1 && coeff != 1.0 {
        if let Expr::Sum(terms) = &rebuilt[0] {
            let scaled = terms
                .iter()
                .map(|t| simplify_product(vec![Expr::Number(coeff), t.clone()]))
                .collect();
            return simplify_sum(scaled);
        }
    }

    match rebuilt.len() {
        0 => Expr::Number(coeff),
        1 if coeff == 1.0 => rebuilt.remove(0),
        _ => with_coefficient(coeff, Expr::Product(rebuilt)),
    }
}

/// `i^n` for integer `n`.
fn imaginary_power(n: i64) -> Expr {
    match n.rem_euclid(4) {
        0 => Expr::one(),
        1 => Expr::ImaginaryUnit,
        2 => Expr::Number(-1.0),
        _ => Expr::Product(vec![Expr::Number(-1.0), Expr::ImaginaryUnit]),
    }
}

fn simplify_pow(base: Expr, exponent: Expr) -> Expr {
    if exponent.is_zero() {
        return Expr::one();
    }
    if exponent.is_one() {
        return base;
    }
    if base.is_one() {
        return Expr::one();
    }

    let exp_num = exponent.as_number();
    let exp_integer = exp_num.map_or(false, is_integer);

    if let (Some(b), Some(e)) = (base.as_number(), exp_num) {
        if b == 0.0 && e > 0.0 {
            return Expr::zero();
        }
        if b > 0.0 || (exp_integer && b != 0.0) {
            let value = b.powf(e);
            if value.is_finite() {
                return Expr::Number(value);
            }
        }
        if b < 0.0 && is_integer(2.0 * e) {
            // (-b)^e * i^(2e)
            let magnitude = (-b).powf(e);
            return simplify_product(vec![
                Expr::Number(magnitude),
                imaginary_power((2.0 * e) as i64),
            ]);
        }
    }

    match &base {
        Expr::ImaginaryUnit if exp_integer => {
            return imaginary_power(exp_num.unwrap_or(0.0) as i64);
        }
        Expr::Pow(inner_base, inner_exp) => {
            if exp_integer || inner_base.is_positive() {
                let combined = simplify_product(vec![inner_exp.as_ref().clone(), exponent.clone()]);
                return simplify_pow(inner_base.as_ref().clone(), combined);
            }
        }
        Expr::Product(factors) => {
            if exp_integer {
                return simplify_product(
                    factors
                        .iter()
                        .map(|f| simplify_pow(f.clone(), exponent.clone()))
                        .collect(),
                );
            }
            if let Some(split) = split_fractional_power(factors, &exponent) {
                return split;
            }
        }
        Expr::Function(Func::Exp, arg) if exp_integer || arg.is_real() => {
            let scaled = simplify_product(vec![arg.as_ref().clone(), exponent.clone()]);
            return simplify_function(Func::Exp, scaled);
        }
        _ => {}
    }

    Expr::pow(base, exponent)
}

/// `(c * a * b)^e -> c^e * a^e * b^e` for non-integer `e` when every symbolic
/// factor is provably positive. A negative coefficient contributes `(-1)^e`,
/// which is only rewritten for half-integer `e`.
fn split_fractional_power(factors: &[Expr], exponent: &Expr) -> Option<Expr> {
    let mut coeff = 1.0;
    let mut positive = Vec::new();
    for factor in factors {
        match factor {
            Expr::Number(v) => coeff *= v,
            other if other.is_positive() => positive.push(other.clone()),
            _ => return None,
        }
    }
    let mut out: Vec<Expr> = positive
        .into_iter()
        .map(|f| simplify_pow(f, exponent.clone()))
        .collect();
    if coeff < 0.0 {
        let e = exponent.as_number()?;
        if !is_integer(2.0 * e) {
            return None;
        }
        out.push(imaginary_power((2.0 * e) as i64));
        coeff = -coeff;
    }
    out.push(simplify_pow(Expr::Number(coeff), exponent.clone()));
    Some(simplify_product(out))
}

/// Multiple of pi as a plain number: `k*pi -> Some(k)`.
fn pi_multiple(arg: &Expr) -> Option<f64> {
    match arg {
        Expr::Pi => Some(1.0),
        Expr::Product(_) => {
            let (coeff, rest) = arg.split_coefficient();
            (rest == Expr::Pi).then_some(coeff)
        }
        _ => None,
    }
}

fn simplify_function(func: Func, arg: Expr) -> Expr {
    if let Some(v) = arg.as_number() {
        let value = func.apply_f64(v);
        if value.is_finite() {
            return Expr::Number(value);
        }
    }

    match func {
        Func::Sin | Func::Cos => {
            if let Some(k) = pi_multiple(&arg) {
                let half_steps = 2.0 * k;
                if is_integer(half_steps) {
                    let n = half_steps as i64;
                    // sin(n*pi/2), cos(n*pi/2) cycle with period 4
                    let (sin, cos) = match n.rem_euclid(4) {
                        0 => (0.0, 1.0),
                        1 => (1.0, 0.0),
                        2 => (0.0, -1.0),
                        _ => (-1.0, 0.0),
                    };
                    return Expr::Number(if func == Func::Sin { sin } else { cos });
                }
            }
            if is_negative_argument(&arg) {
                let flipped = simplify_product(vec![Expr::Number(-1.0), arg]);
                return match func {
                    Func::Sin => simplify_product(vec![
                        Expr::Number(-1.0),
                        Expr::Function(Func::Sin, Box::new(flipped)),
                    ]),
                    _ => Expr::Function(Func::Cos, Box::new(flipped)),
                };
            }
        }
        Func::Ln => {
            if let Expr::Function(Func::Exp, inner) = &arg {
                if inner.is_real() {
                    return inner.as_ref().clone();
                }
            }
            if arg == Expr::ImaginaryUnit {
                return Expr::Product(vec![
                    Expr::Number(0.5),
                    Expr::ImaginaryUnit,
                    Expr::Pi,
                ]);
            }
        }
        Func::Exp => {
            if let Expr::Function(Func::Ln, inner) = &arg {
                return inner.as_ref().clone();
            }
        }
    }
    Expr::Function(func, Box::new(arg))
}

fn is_negative_argument(arg: &Expr) -> bool {
    match arg {
        Expr::Product(_) => arg.split_coefficient().0 < 0.0,
        Expr::Sum(terms) => terms.iter().all(|t| t.split_coefficient().0 < 0.0),
        _ => false,
    }
}

fn expand_node(expr: &Expr) -> Expr {
    match expr {
        Expr::Sum(terms) => Expr::Sum(terms.iter().map(expand_node).collect()),
        Expr::Product(factors) => {
            let mut acc: Vec<Expr> = vec![Expr::one()];
            for factor in factors {
                let factor = expand_node(factor);
                let parts = match factor {
                    Expr::Sum(terms) => terms,
                    other => vec![other],
                };
                let mut next = Vec::with_capacity(acc.len() * parts.len());
                for left in &acc {
                    for right in &parts {
                        next.push(Expr::product(vec![left.clone(), right.clone()]));
                    }
                }
                acc = next;
            }
            Expr::sum(acc)
        }
        Expr::Pow(base, exponent) => {
            let base = expand_node(base);
            match (exponent.as_number(), &base) {
                (Some(n), Expr::Sum(_)) if is_integer(n) && n > 1.0 && n <= MAX_EXPAND_POWER => {
                    let repeated = vec![base.clone(); n as usize];
                    expand_node(&Expr::Product(repeated))
                }
                _ => Expr::pow(base, exponent.as_ref().clone()),
            }
        }
        Expr::Function(func, arg) => Expr::Function(*func, Box::new(expand_node(arg))),
        atom => atom.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::symbol::Symbol;

    fn x() -> Expr {
        Expr::from(Symbol::real("x"))
    }

    fn g() -> Expr {
        Expr::from(Symbol::positive("g"))
    }

    fn l() -> Expr {
        Expr::from(Symbol::positive("l"))
    }

    #[test]
    fn collects_like_terms_and_folds_constants() {
        let e = x() * 3.0 + 2.0 + x() * 2.0 - 2.0;
        assert_eq!(e.simplify(), (x() * 5.0).simplify());
        assert!((x() - x()).simplify().is_zero());
    }

    #[test]
    fn merges_powers_of_equal_bases() {
        let e = x() * x() * Expr::powf(x(), -2.0);
        assert!(e.simplify().is_one());
        let root = Expr::sqrt(g() / l());
        assert_eq!((root.clone() * root).simplify(), (g() / l()).simplify());
    }

    #[test]
    fn operand_order_does_not_matter() {
        let a = (g() * x() + Expr::sin(x())).simplify();
        let b = (Expr::sin(x()) + x() * g()).simplify();
        assert_eq!(a, b);
    }

    #[test]
    fn square_root_of_negative_positive_ratio_is_imaginary() {
        let e = Expr::sqrt(-(g() / l())).simplify();
        let expected = Expr::ImaginaryUnit * Expr::sqrt(g()) * Expr::powf(l(), -0.5);
        assert_eq!(e, expected.simplify());
        assert_eq!(Expr::sqrt(Expr::num(-4.0)).simplify(), (Expr::ImaginaryUnit * 2.0).simplify());
    }

    #[test]
    fn real_symbols_keep_fractional_powers_unsplit() {
        let e = Expr::sqrt(x() * x()).simplify();
        assert!(matches!(e, Expr::Pow(_, _)));
    }

    #[test]
    fn imaginary_unit_powers_cycle() {
        let i = Expr::ImaginaryUnit;
        assert_eq!((i.clone() * i.clone()).simplify(), Expr::num(-1.0));
        assert_eq!(Expr::powf(i, 4.0).simplify(), Expr::one());
    }

    #[test]
    fn trig_at_multiples_of_pi() {
        assert!(Expr::sin(Expr::Pi).simplify().is_zero());
        assert_eq!(Expr::cos(-Expr::Pi).simplify(), Expr::num(-1.0));
        assert_eq!(Expr::sin(Expr::Pi * 0.5).simplify(), Expr::one());
        assert_eq!(Expr::cos(Expr::zero()).simplify(), Expr::one());
    }

    #[test]
    fn odd_and_even_symmetry() {
        let e = Expr::sin(-x()).simplify();
        assert_eq!(e, (-Expr::sin(x())).simplify());
        assert_eq!(Expr::cos(-x()).simplify(), Expr::cos(x()));
    }

    #[test]
    fn expand_distributes_over_sums() {
        let e = ((x() + 1.0) * (x() - 1.0)).expand();
        let expected = (Expr::powf(x(), 2.0) - 1.0).simplify();
        assert_eq!(e, expected);
    }

    #[test]
    fn sign_analysis_follows_domains() {
        assert!((g() / l()).is_positive());
        assert!((-(g() * l())).is_negative());
        assert_eq!(x().sign(), None);
        assert!(Expr::powf(x(), 2.0).sign().is_none());
        assert!(Expr::exp(x()).is_positive());
    }
}

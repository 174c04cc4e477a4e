use crate::error::{SymbolicError, SymbolicResult};
use crate::expr::Expr;
use nalgebra::linalg::SVD;
use nalgebra::{DMatrix, DVector};
use num_complex::Complex;
use std::cmp::Ordering;
use std::fmt;

/// Dense symbolic matrix, row-major.
#[derive(Debug, Clone, PartialEq)]
pub struct Matrix {
    rows: usize,
    cols: usize,
    data: Vec<Expr>,
}

impl Matrix {
    pub fn from_fn(rows: usize, cols: usize, mut f: impl FnMut(usize, usize) -> Expr) -> Self {
        let mut data = Vec::with_capacity(rows * cols);
        for i in 0..rows {
            for j in 0..cols {
                data.push(f(i, j));
            }
        }
        Self { rows, cols, data }
    }

    pub fn from_rows(rows: Vec<Vec<Expr>>) -> SymbolicResult<Self> {
        let cols = rows.first().map_or(0, Vec::len);
        let n_rows = rows.len();
        let mut data = Vec::with_capacity(n_rows * cols);
        for row in rows {
            if row.len() != cols {
                return Err(SymbolicError::DimensionMismatch {
                    expected: cols,
                    got: row.len(),
                });
            }
            data.extend(row);
        }
        Ok(Self {
            rows: n_rows,
            cols,
            data,
        })
    }

    pub fn identity(n: usize) -> Self {
        Self::from_fn(n, n, |i, j| if i == j { Expr::one() } else { Expr::zero() })
    }

    /// `J[i][j] = d fields[i] / d vars[j]`.
    pub fn jacobian(fields: &[Expr], vars: &[Expr]) -> Self {
        Self::from_fn(fields.len(), vars.len(), |i, j| fields[i].diff(&vars[j]))
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn is_square(&self) -> bool {
        self.rows == self.cols
    }

    pub fn get(&self, i: usize, j: usize) -> &Expr {
        &self.data[i * self.cols + j]
    }

    pub fn row(&self, i: usize) -> &[Expr] {
        &self.data[i * self.cols..(i + 1) * self.cols]
    }

    pub fn map(&self, f: impl Fn(&Expr) -> Expr) -> Self {
        Self {
            rows: self.rows,
            cols: self.cols,
            data: self.data.iter().map(f).collect(),
        }
    }

    pub fn simplify(&self) -> Self {
        self.map(Expr::simplify)
    }

    pub fn subs_all(&self, pairs: &[(Expr, Expr)]) -> Self {
        self.map(|e| e.subs_all(pairs))
    }

    pub fn mul_vector(&self, vector: &[Expr]) -> SymbolicResult<Vec<Expr>> {
        if vector.len() != self.cols {
            return Err(SymbolicError::DimensionMismatch {
                expected: self.cols,
                got: vector.len(),
            });
        }
        Ok((0..self.rows)
            .map(|i| {
                let terms = self
                    .row(i)
                    .iter()
                    .zip(vector)
                    .filter(|(a, _)| !a.is_zero())
                    .map(|(a, x)| a * x)
                    .collect();
                Expr::sum(terms).simplify()
            })
            .collect())
    }

    fn require_square(&self) -> SymbolicResult<()> {
        if self.is_square() {
            Ok(())
        } else {
            Err(SymbolicError::DimensionMismatch {
                expected: self.rows,
                got: self.cols,
            })
        }
    }

    pub fn trace(&self) -> SymbolicResult<Expr> {
        self.require_square()?;
        Ok(Expr::sum((0..self.rows).map(|i| self.get(i, i).clone()).collect()).simplify())
    }

    /// Cofactor expansion along the first row.
    pub fn determinant(&self) -> SymbolicResult<Expr> {
        self.require_square()?;
        Ok(self.cofactor_expansion().simplify())
    }

    fn cofactor_expansion(&self) -> Expr {
        match self.rows {
            0 => Expr::one(),
            1 => self.get(0, 0).clone(),
            2 => self.get(0, 0) * self.get(1, 1) - self.get(0, 1) * self.get(1, 0),
            n => {
                let mut terms = Vec::with_capacity(n);
                for j in 0..n {
                    let entry = self.get(0, j);
                    if entry.is_zero() {
                        continue;
                    }
                    let minor = self.minor(0, j).cofactor_expansion();
                    let sign = if j % 2 == 0 { 1.0 } else { -1.0 };
                    terms.push(Expr::product(vec![Expr::num(sign), entry.clone(), minor]));
                }
                Expr::sum(terms)
            }
        }
    }

    fn minor(&self, row: usize, col: usize) -> Self {
        let mut data = Vec::with_capacity((self.rows - 1) * (self.cols - 1));
        for i in (0..self.rows).filter(|&i| i != row) {
            for j in (0..self.cols).filter(|&j| j != col) {
                data.push(self.get(i, j).clone());
            }
        }
        Self {
            rows: self.rows - 1,
            cols: self.cols - 1,
            data,
        }
    }

    /// Eigenvalues in closed form for 1x1 and 2x2 matrices. Larger matrices
    /// must be fully numeric; their eigenvalues come back as `re + im*I`.
    pub fn eigenvalues(&self) -> SymbolicResult<Vec<Expr>> {
        self.require_square()?;
        match self.rows {
            0 => Ok(Vec::new()),
            1 => Ok(vec![self.get(0, 0).simplify()]),
            2 => {
                let half_trace = (self.trace()? * 0.5).simplify();
                let det = self.determinant()?;
                let discriminant =
                    (Expr::powf(half_trace.clone(), 2.0) - det).expand();
                let root = Expr::sqrt(discriminant).simplify();
                Ok(vec![
                    (&half_trace - &root).simplify(),
                    (&half_trace + &root).simplify(),
                ])
            }
            _ => {
                let numeric = self.to_numeric(&[])?;
                Ok(numeric_eigenvalues(&numeric)
                    .into_iter()
                    .map(complex_to_expr)
                    .collect())
            }
        }
    }

    /// Evaluates every entry with the given bindings.
    pub fn to_numeric(&self, bindings: &[(Expr, f64)]) -> SymbolicResult<DMatrix<f64>> {
        let values = self
            .data
            .iter()
            .map(|e| e.eval_real(bindings))
            .collect::<SymbolicResult<Vec<_>>>()?;
        Ok(DMatrix::from_row_slice(self.rows, self.cols, &values))
    }
}

impl fmt::Display for Matrix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Matrix([")?;
        for i in 0..self.rows {
            if i > 0 {
                f.write_str(", ")?;
            }
            f.write_str("[")?;
            for (j, entry) in self.row(i).iter().enumerate() {
                if j > 0 {
                    f.write_str(", ")?;
                }
                write!(f, "{}", entry)?;
            }
            f.write_str("]")?;
        }
        f.write_str("])")
    }
}

pub fn complex_to_expr(value: Complex<f64>) -> Expr {
    if value.im == 0.0 {
        return Expr::num(value.re);
    }
    (Expr::num(value.re) + Expr::num(value.im) * Expr::ImaginaryUnit).simplify()
}

fn cmp_complex(a: &Complex<f64>, b: &Complex<f64>) -> Ordering {
    a.re.total_cmp(&b.re).then_with(|| a.im.total_cmp(&b.im))
}

/// Eigenvalues sorted by real then imaginary part.
pub fn numeric_eigenvalues(matrix: &DMatrix<f64>) -> Vec<Complex<f64>> {
    let mut values: Vec<Complex<f64>> = matrix.complex_eigenvalues().iter().copied().collect();
    values.sort_by(cmp_complex);
    values
}

/// Eigenvalues, repeated by multiplicity, paired with unit-norm eigenvectors.
/// A repeated eigenvalue gets a basis of its eigenspace: the right singular
/// vectors of `A - lambda*I` with the smallest singular values. Eigenvalues
/// below the real axis reuse the conjugated vectors of their partner. A
/// defective matrix fails with [`SymbolicError::NotDiagonalizable`].
pub fn numeric_eigenpairs(
    matrix: &DMatrix<f64>,
) -> SymbolicResult<Vec<(Complex<f64>, DVector<Complex<f64>>)>> {
    let dim = matrix.nrows();
    if matrix.ncols() != dim {
        return Err(SymbolicError::DimensionMismatch {
            expected: dim,
            got: matrix.ncols(),
        });
    }
    let values = numeric_eigenvalues(matrix);
    let scale = values.iter().map(|l| l.norm()).fold(1.0, f64::max);
    let merge = 1e-6 * scale;

    let mut clusters: Vec<(Complex<f64>, usize)> = Vec::new();
    for lambda in values {
        match clusters.iter_mut().find(|(c, _)| (*c - lambda).norm() <= merge) {
            Some((_, count)) => *count += 1,
            None => clusters.push((lambda, 1)),
        }
    }

    let complex_matrix = matrix.map(|v| Complex::new(v, 0.0));
    let mut bases: Vec<Option<Vec<DVector<Complex<f64>>>>> = vec![None; clusters.len()];
    for (slot, &(lambda, multiplicity)) in bases.iter_mut().zip(&clusters) {
        if lambda.im >= -merge {
            *slot = Some(eigenspace(&complex_matrix, lambda, multiplicity, scale)?);
        }
    }

    let mut pairs = Vec::with_capacity(dim);
    for (index, &(lambda, multiplicity)) in clusters.iter().enumerate() {
        let basis = match &bases[index] {
            Some(basis) => basis.clone(),
            None => {
                let partner = clusters.iter().position(|(other, count)| {
                    *count == multiplicity && (other.conj() - lambda).norm() <= merge
                });
                match partner.and_then(|p| bases[p].as_ref()) {
                    Some(basis) => basis.iter().map(|v| v.map(|c| c.conj())).collect(),
                    None => eigenspace(&complex_matrix, lambda, multiplicity, scale)?,
                }
            }
        };
        pairs.extend(basis.into_iter().map(|vector| (lambda, vector)));
    }
    Ok(pairs)
}

fn eigenspace(
    complex_matrix: &DMatrix<Complex<f64>>,
    lambda: Complex<f64>,
    multiplicity: usize,
    scale: f64,
) -> SymbolicResult<Vec<DVector<Complex<f64>>>> {
    let dim = complex_matrix.nrows();
    let mut shifted = complex_matrix.clone();
    for i in 0..dim {
        shifted[(i, i)] -= lambda;
    }

    let svd = SVD::new(shifted, false, true);
    let v_t = svd.v_t.ok_or(SymbolicError::Singular)?;
    let singular = svd.singular_values;
    let mut order: Vec<usize> = (0..singular.len()).collect();
    order.sort_by(|&a, &b| singular[a].total_cmp(&singular[b]));

    // Geometric multiplicity must reach the algebraic one.
    if multiplicity > 1 {
        let rank_deficit = order.iter().filter(|&&k| singular[k] <= 1e-7 * scale).count();
        if rank_deficit < multiplicity {
            return Err(SymbolicError::NotDiagonalizable(format!("{}", lambda)));
        }
    }

    Ok(order
        .iter()
        .take(multiplicity)
        .map(|&k| {
            let mut vector: DVector<Complex<f64>> =
                DVector::from_iterator(dim, v_t.row(k).iter().map(|c| c.conj()));
            normalize_complex_vector(&mut vector);
            vector
        })
        .collect())
}

fn normalize_complex_vector(vector: &mut DVector<Complex<f64>>) {
    let norm = vector.iter().map(|c| c.norm_sqr()).sum::<f64>().sqrt();
    if norm > 0.0 {
        for entry in vector.iter_mut() {
            *entry /= norm;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::symbol::Symbol;

    fn sym(name: &str) -> Expr {
        Expr::from(Symbol::real(name))
    }

    #[test]
    fn jacobian_of_pendulum_field() {
        let theta = sym("theta");
        let omega = sym("omega");
        let g = Expr::from(Symbol::positive("g"));
        let fields = vec![omega.clone(), (-g.clone() * Expr::sin(theta.clone())).simplify()];
        let j = Matrix::jacobian(&fields, &[theta.clone(), omega]);
        assert!(j.get(0, 0).is_zero());
        assert!(j.get(0, 1).is_one());
        assert_eq!(*j.get(1, 0), (-g * Expr::cos(theta)).simplify());
        assert!(j.get(1, 1).is_zero());
    }

    #[test]
    fn determinant_by_cofactors() {
        let m = Matrix::from_fn(3, 3, |i, j| Expr::num([[2.0, 0.0, 1.0], [1.0, 3.0, 2.0], [1.0, 1.0, 1.0]][i][j]));
        assert_eq!(m.determinant().expect("square"), Expr::num(0.0));
        let a = sym("a");
        let diag = Matrix::from_fn(3, 3, |i, j| if i == j { a.clone() } else { Expr::zero() });
        assert_eq!(diag.determinant().expect("square"), Expr::powf(a, 3.0));
    }

    #[test]
    fn ragged_rows_are_rejected() {
        let err = Matrix::from_rows(vec![vec![Expr::one(), Expr::zero()], vec![Expr::one()]]);
        assert_eq!(err, Err(SymbolicError::DimensionMismatch { expected: 2, got: 1 }));
    }

    #[test]
    fn two_by_two_eigenvalues_are_closed_form() {
        let g = Expr::from(Symbol::positive("g"));
        let l = Expr::from(Symbol::positive("l"));
        let j = Matrix::from_rows(vec![
            vec![Expr::zero(), Expr::one()],
            vec![(-g.clone() / l.clone()).simplify(), Expr::zero()],
        ])
        .expect("rectangular");
        let rate = (Expr::sqrt(g.clone()) * Expr::powf(l.clone(), -0.5)).simplify();
        let expected = (Expr::ImaginaryUnit * rate).simplify();
        let values = j.eigenvalues().expect("square");
        assert_eq!(values[1], expected);
        assert_eq!(values[0], (-expected).simplify());
    }

    #[test]
    fn numeric_eigenpairs_satisfy_definition() {
        let a = DMatrix::from_row_slice(2, 2, &[0.0, 1.0, -4.0, 0.0]);
        let pairs = numeric_eigenpairs(&a).expect("square");
        let ac = a.map(|v| Complex::new(v, 0.0));
        for (lambda, v) in pairs {
            assert!((lambda.im.abs() - 2.0).abs() < 1e-10);
            let residual = &ac * &v - v.clone() * lambda;
            assert!(residual.norm() < 1e-9);
        }
    }

    #[test]
    fn repeated_eigenvalues_get_independent_vectors() {
        let a = DMatrix::from_row_slice(3, 3, &[2.0, 0.0, 0.0, 0.0, 2.0, 0.0, 0.0, 0.0, 5.0]);
        let pairs = numeric_eigenpairs(&a).expect("diagonal");
        assert_eq!(pairs.len(), 3);
        let modes = DMatrix::from_fn(3, 3, |i, k| pairs[k].1[i]);
        assert!(modes.determinant().norm() > 1e-6);

        let jordan = DMatrix::from_row_slice(2, 2, &[3.0, 1.0, 0.0, 3.0]);
        assert!(matches!(
            numeric_eigenpairs(&jordan),
            Err(SymbolicError::NotDiagonalizable(_))
        ));
    }

    #[test]
    fn conjugate_eigenvalues_get_conjugate_vectors() {
        let a = DMatrix::from_row_slice(2, 2, &[0.0, 1.0, -4.0, 0.0]);
        let pairs = numeric_eigenpairs(&a).expect("square");
        let (low, high) = (&pairs[0], &pairs[1]);
        assert!(low.0.im < 0.0 && high.0.im > 0.0);
        assert!((&low.1 - high.1.map(|c| c.conj())).norm() < 1e-12);
    }

    #[test]
    fn display_lists_rows() {
        let m = Matrix::identity(2);
        assert_eq!(m.to_string(), "Matrix([[1, 0], [0, 1]])");
    }
}

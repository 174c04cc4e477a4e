use num_traits::{Float, FromPrimitive};
use std::fmt::Debug;

/// Numeric type the compiled right-hand sides and integrators run on.
pub trait Scalar: Float + FromPrimitive + Debug + 'static {}

impl<T: Float + FromPrimitive + Debug + 'static> Scalar for T {}

/// A first-order system `x' = f(t, x)`.
pub trait DynamicalSystem<T: Scalar> {
    fn dimension(&self) -> usize;

    /// Writes `f(t, x)` into `out`, which has length `dimension()`.
    fn apply(&self, t: T, x: &[T], out: &mut [T]);
}

/// A fixed-step integrator. Advances `t` and `state` in place by `dt`.
pub trait Steppable<T: Scalar> {
    fn step(&mut self, system: &impl DynamicalSystem<T>, t: &mut T, state: &mut [T], dt: T);
}

/// Adapts a closure into a [`DynamicalSystem`].
pub struct FnSystem<F> {
    dimension: usize,
    field: F,
}

impl<F> FnSystem<F> {
    pub fn new(dimension: usize, field: F) -> Self {
        Self { dimension, field }
    }
}

impl<T, F> DynamicalSystem<T> for FnSystem<F>
where
    T: Scalar,
    F: Fn(T, &[T], &mut [T]),
{
    fn dimension(&self) -> usize {
        self.dimension
    }

    fn apply(&self, t: T, x: &[T], out: &mut [T]) {
        (self.field)(t, x, out)
    }
}

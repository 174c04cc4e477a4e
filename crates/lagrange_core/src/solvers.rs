use crate::traits::{DynamicalSystem, Scalar, Steppable};

/// Explicit Runge-Kutta coefficients. `a` is stored row by row, lower
/// triangular, so stage `i` reads `a[i][..i]`.
struct Tableau {
    order: usize,
    c: &'static [f64],
    a: &'static [&'static [f64]],
    b: &'static [f64],
}

const RK4_TABLEAU: Tableau = Tableau {
    order: 4,
    c: &[0.0, 0.5, 0.5, 1.0],
    a: &[&[], &[0.5], &[0.0, 0.5], &[0.0, 0.0, 1.0]],
    b: &[1.0 / 6.0, 1.0 / 3.0, 1.0 / 3.0, 1.0 / 6.0],
};

// Tsitouras 5(4), fifth-order weights.
const TSIT5_TABLEAU: Tableau = Tableau {
    order: 5,
    c: &[0.0, 0.161, 0.327, 0.9, 0.9800255409045097, 1.0],
    a: &[
        &[],
        &[0.161],
        &[-0.008480655492356989, 0.335480655492357],
        &[2.897153057105493, -6.359448489975075, 4.3622954328695815],
        &[
            5.325864828439257,
            -11.748883564062828,
            7.4955393428898365,
            -0.09249506636175525,
        ],
        &[
            5.86145544294642,
            -12.92096931784711,
            8.159367898576159,
            -0.071584973281401,
            -0.028269050394068383,
        ],
    ],
    b: &[
        0.09646076681806523,
        0.01,
        0.4798896504144996,
        1.379008574103742,
        -3.290069515436081,
        2.324710524099774,
    ],
};

fn lift<T: Scalar>(value: f64) -> T {
    T::from_f64(value).unwrap_or_else(T::nan)
}

/// Fixed-step explicit Runge-Kutta integrator with preallocated stage buffers.
pub struct RungeKutta<T: Scalar> {
    tableau: &'static Tableau,
    stages: Vec<Vec<T>>,
    tmp: Vec<T>,
}

impl<T: Scalar> RungeKutta<T> {
    fn with_tableau(tableau: &'static Tableau, dim: usize) -> Self {
        Self {
            tableau,
            stages: vec![vec![T::zero(); dim]; tableau.b.len()],
            tmp: vec![T::zero(); dim],
        }
    }

    /// Classic fourth-order method.
    pub fn rk4(dim: usize) -> Self {
        Self::with_tableau(&RK4_TABLEAU, dim)
    }

    /// Tsitouras 5/4 pair, stepped at fifth order with a fixed step.
    pub fn tsit5(dim: usize) -> Self {
        Self::with_tableau(&TSIT5_TABLEAU, dim)
    }

    pub fn order(&self) -> usize {
        self.tableau.order
    }
}

impl<T: Scalar> Steppable<T> for RungeKutta<T> {
    fn step(&mut self, system: &impl DynamicalSystem<T>, t: &mut T, state: &mut [T], dt: T) {
        let t0 = *t;
        let tableau = self.tableau;

        for stage in 0..tableau.b.len() {
            for i in 0..state.len() {
                let mut increment = T::zero();
                for (j, &a) in tableau.a[stage].iter().enumerate() {
                    if a != 0.0 {
                        increment = increment + lift::<T>(a) * self.stages[j][i];
                    }
                }
                self.tmp[i] = state[i] + dt * increment;
            }
            system.apply(
                t0 + lift::<T>(tableau.c[stage]) * dt,
                &self.tmp,
                &mut self.stages[stage],
            );
        }

        for i in 0..state.len() {
            let mut increment = T::zero();
            for (k, &b) in self.stages.iter().zip(tableau.b) {
                increment = increment + lift::<T>(b) * k[i];
            }
            state[i] = state[i] + dt * increment;
        }

        *t = t0 + dt;
    }
}

/// Integrates from `t0` over `steps` fixed steps of `dt`, returning the
/// sample times and the state at each (both including the initial point).
pub fn integrate<T, S>(
    system: &impl DynamicalSystem<T>,
    stepper: &mut S,
    t0: T,
    initial: &[T],
    dt: T,
    steps: usize,
) -> (Vec<T>, Vec<Vec<T>>)
where
    T: Scalar,
    S: Steppable<T>,
{
    let mut t = t0;
    let mut state = initial.to_vec();
    let mut times = Vec::with_capacity(steps + 1);
    let mut states = Vec::with_capacity(steps + 1);
    times.push(t);
    states.push(state.clone());
    for _ in 0..steps {
        stepper.step(system, &mut t, &mut state, dt);
        times.push(t);
        states.push(state.clone());
    }
    (times, states)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::FnSystem;

    fn oscillator() -> FnSystem<impl Fn(f64, &[f64], &mut [f64])> {
        FnSystem::new(2, |_t: f64, x: &[f64], out: &mut [f64]| {
            out[0] = x[1];
            out[1] = -x[0];
        })
    }

    #[test]
    fn rk4_tracks_harmonic_oscillator() {
        let system = oscillator();
        let mut stepper = RungeKutta::rk4(2);
        let (times, states) = integrate(&system, &mut stepper, 0.0, &[1.0, 0.0], 0.01, 1000);
        let t_end = *times.last().expect("non-empty");
        let last = states.last().expect("non-empty");
        assert!((t_end - 10.0).abs() < 1e-9);
        assert!((last[0] - t_end.cos()).abs() < 1e-8);
        assert!((last[1] + t_end.sin()).abs() < 1e-8);
    }

    #[test]
    fn tsit5_is_more_accurate_than_rk4_at_coarse_steps() {
        let system = oscillator();
        let (_, rk4) = integrate(&system, &mut RungeKutta::rk4(2), 0.0, &[1.0, 0.0], 0.2, 50);
        let (_, tsit) = integrate(&system, &mut RungeKutta::tsit5(2), 0.0, &[1.0, 0.0], 0.2, 50);
        let exact = 10.0_f64.cos();
        let rk4_err = (rk4[50][0] - exact).abs();
        let tsit_err = (tsit[50][0] - exact).abs();
        assert!(tsit_err < rk4_err, "tsit5 {} vs rk4 {}", tsit_err, rk4_err);
        assert_eq!(RungeKutta::<f64>::tsit5(2).order(), 5);
    }

    #[test]
    fn tsit5_converges_at_fifth_order() {
        let system = oscillator();
        let error = |dt: f64, steps: usize| {
            let (_, states) =
                integrate(&system, &mut RungeKutta::tsit5(2), 0.0, &[1.0, 0.0], dt, steps);
            (states[steps][0] - 2.0_f64.cos()).abs()
        };
        let ratio = error(0.1, 20) / error(0.05, 40);
        assert!(ratio > 20.0 && ratio < 45.0, "error ratio {}", ratio);
    }

    #[test]
    fn stage_rows_sum_to_their_nodes() {
        for tableau in [&RK4_TABLEAU, &TSIT5_TABLEAU] {
            for (row, c) in tableau.a.iter().zip(tableau.c) {
                assert!((row.iter().sum::<f64>() - c).abs() < 1e-12);
            }
            assert!((tableau.b.iter().sum::<f64>() - 1.0).abs() < 1e-12);
        }
    }

    #[test]
    fn time_dependent_field_uses_stage_times() {
        // x' = t, x(0) = 0 -> x(1) = 0.5 exactly for any order >= 2.
        let system = FnSystem::new(1, |t: f64, _x: &[f64], out: &mut [f64]| out[0] = t);
        let (_, states) = integrate(&system, &mut RungeKutta::rk4(1), 0.0, &[0.0], 0.1, 10);
        assert!((states[10][0] - 0.5).abs() < 1e-12);
    }
}

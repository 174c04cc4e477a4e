use crate::expr::Expr;
use crate::symbol::{Coordinate, Symbol};

/// `d/dt(dL/dq') - dL/dq` for each coordinate, in order.
pub fn euler_lagrange(lagrangian: &Expr, coordinates: &[Coordinate], time: &Symbol) -> Vec<Expr> {
    coordinates
        .iter()
        .map(|q| {
            let position = Expr::from(q.nth(q.order()));
            let velocity = Expr::from(q.nth(q.order() + 1));
            let momentum = lagrangian.diff(&velocity);
            (momentum.time_derivative(time) - lagrangian.diff(&position)).simplify()
        })
        .collect()
}

/// Point mass `m` on a massless rod of length `l` under gravity `g`,
/// described by the angle `theta(t)` from the downward vertical.
#[derive(Debug, Clone)]
pub struct SimplePendulum {
    pub mass: Symbol,
    pub length: Symbol,
    pub gravity: Symbol,
    pub time: Symbol,
    pub angle: Coordinate,
}

impl SimplePendulum {
    pub fn new(angle: &str, time: &str) -> Self {
        let time = Symbol::positive(time);
        Self {
            mass: Symbol::positive("m"),
            length: Symbol::positive("l"),
            gravity: Symbol::positive("g"),
            angle: Coordinate::new(angle, &time),
            time,
        }
    }

    fn m(&self) -> Expr {
        Expr::from(&self.mass)
    }

    fn l(&self) -> Expr {
        Expr::from(&self.length)
    }

    /// Tangential speed `l * theta'`.
    pub fn speed(&self) -> Expr {
        self.l() * Expr::from(self.angle.derivative())
    }

    pub fn kinetic_energy(&self) -> Expr {
        Expr::num(0.5) * self.m() * Expr::powf(self.speed(), 2.0)
    }

    /// Height above the lowest point, `l * (1 - cos(theta))`.
    pub fn height(&self) -> Expr {
        self.l() * (1.0 - Expr::cos(Expr::from(&self.angle)))
    }

    pub fn potential_energy(&self) -> Expr {
        self.m() * Expr::from(&self.gravity) * self.height()
    }

    pub fn lagrangian(&self) -> Expr {
        self.kinetic_energy() - self.potential_energy()
    }

    /// The Euler-Lagrange expression for the angle.
    pub fn euler_lagrange(&self) -> Expr {
        let mut equations = euler_lagrange(&self.lagrangian(), &[self.angle.clone()], &self.time);
        equations.pop().unwrap_or_else(Expr::zero)
    }

    /// Euler-Lagrange expression divided by `m * l^2`, expanded.
    pub fn equation_of_motion(&self) -> Expr {
        let scale = self.m() * Expr::powf(self.l(), 2.0);
        (self.euler_lagrange() / scale).expand()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pendulum_equation_of_motion() {
        let pendulum = SimplePendulum::new("theta", "t");
        let g = Expr::from(&pendulum.gravity);
        let l = Expr::from(&pendulum.length);
        let expected = (Expr::from(pendulum.angle.nth(2))
            + g / l * Expr::sin(Expr::from(&pendulum.angle)))
        .expand();
        assert_eq!(pendulum.equation_of_motion(), expected);
    }

    #[test]
    fn unscaled_expression_carries_mass_and_length() {
        let pendulum = SimplePendulum::new("theta", "t");
        let el = pendulum.euler_lagrange();
        assert!(el.depends_on(&Expr::from(&pendulum.mass)));
        assert!(el.depends_on(&Expr::from(pendulum.angle.nth(2))));
        assert!(!el.depends_on(&Expr::from(pendulum.angle.nth(1))));
    }

    #[test]
    fn free_particle_in_two_coordinates() {
        let t = Symbol::positive("t");
        let x = Coordinate::new("x", &t);
        let y = Coordinate::new("y", &t);
        let m = Expr::from(Symbol::positive("m"));
        let k = Expr::from(Symbol::positive("k"));
        // L = m/2 (x'^2 + y'^2) - k/2 x^2
        let lagrangian = 0.5 * m.clone()
            * (Expr::powf(Expr::from(x.derivative()), 2.0)
                + Expr::powf(Expr::from(y.derivative()), 2.0))
            - 0.5 * k.clone() * Expr::powf(Expr::from(&x), 2.0);
        let eqs = euler_lagrange(&lagrangian, &[x.clone(), y.clone()], &t);
        assert_eq!(
            eqs[0],
            (m.clone() * Expr::from(x.nth(2)) + k * Expr::from(&x)).simplify()
        );
        assert_eq!(eqs[1], (m * Expr::from(y.nth(2))).simplify());
    }
}

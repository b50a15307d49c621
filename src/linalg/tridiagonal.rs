//! Tridiagonal systems for implicit column solves
//!
//! Row `i` reads `L[i] x[i-1] + D[i] x[i] + U[i] x[i+1] = rhs[i]`; `L[0]` and
//! `U[n-1]` are ignored.

use std::fmt::Write;

/// Coefficients of a tridiagonal system with a fixed capacity
#[derive(Debug, Clone)]
pub struct TridiagonalSystem {
    pub l: Vec<f64>,
    pub d: Vec<f64>,
    pub u: Vec<f64>,
    pub rhs: Vec<f64>,
    work: Vec<f64>,
}

impl TridiagonalSystem {
    pub fn new(capacity: usize) -> Self {
        Self {
            l: vec![0.0; capacity],
            d: vec![0.0; capacity],
            u: vec![0.0; capacity],
            rhs: vec![0.0; capacity],
            work: vec![0.0; capacity],
        }
    }

    pub fn capacity(&self) -> usize {
        self.d.len()
    }

    /// Solve the leading `n` rows by Thomas elimination
    ///
    /// On a zero pivot returns `Err(row)` with the offending row; `x` is then
    /// left partially written.
    pub fn solve(&mut self, n: usize, x: &mut [f64]) -> Result<(), usize> {
        debug_assert!(n <= self.capacity() && x.len() >= n);
        if n == 0 {
            return Ok(());
        }

        let mut b = self.d[0];
        if b == 0.0 || !b.is_finite() {
            return Err(0);
        }
        x[0] = self.rhs[0] / b;

        for i in 1..n {
            self.work[i] = self.u[i - 1] / b;
            b = self.d[i] - self.l[i] * self.work[i];
            if b == 0.0 || !b.is_finite() {
                return Err(i);
            }
            x[i] = (self.rhs[i] - self.l[i] * x[i - 1]) / b;
        }

        for i in (0..n - 1).rev() {
            x[i] -= self.work[i + 1] * x[i + 1];
        }

        Ok(())
    }

    /// Human-readable listing of the first `n` rows for diagnostics
    pub fn dump(&self, n: usize) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "{:>4} {:>14} {:>14} {:>14} {:>14}", "row", "L", "D", "U", "rhs");
        for i in 0..n.min(self.capacity()) {
            let _ = writeln!(
                out,
                "{:>4} {:>14.6e} {:>14.6e} {:>14.6e} {:>14.6e}",
                i, self.l[i], self.d[i], self.u[i], self.rhs[i]
            );
        }
        out
    }
}

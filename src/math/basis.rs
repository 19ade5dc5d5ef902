//! Polynomial bases and bin integration for the background shapes.
//!
//! - Bernstein basis `b_{i,n}(u) = C(n,i) u^i (1-u)^{n-i}` on `u ∈ [0,1]`
//! - Chebyshev polynomials of the first kind `T_k(v)` on `v ∈ [-1,1]`
//! - composite Simpson integration over one bin
//!
//! Numerical notes:
//! - Bernstein values are built with a de Casteljau-style recurrence instead of
//!   explicit binomials so high orders do not lose precision near the edges.
//! - Chebyshev values use the three-term recurrence, which is stable on [-1,1].

/// Sub-intervals per bin for Simpson integration (must be even).
pub const SIMPSON_STEPS: usize = 4;

/// Evaluate all `n + 1` Bernstein basis polynomials of degree `n` at `u`.
pub fn bernstein_basis(n: usize, u: f64, out: &mut Vec<f64>) {
    let u = u.clamp(0.0, 1.0);
    let v = 1.0 - u;

    out.clear();
    out.resize(n + 1, 0.0);
    out[0] = 1.0;
    for k in 1..=n {
        // `prev` carries b_{i-1,k-1} while out[i] is overwritten in place.
        let mut prev = 0.0;
        for i in 0..=k {
            let cur = if i < k { out[i] } else { 0.0 };
            out[i] = v * cur + u * prev;
            prev = cur;
        }
    }
}

/// Chebyshev polynomial `T_k(v)`.
pub fn chebyshev(k: usize, v: f64) -> f64 {
    match k {
        0 => 1.0,
        1 => v,
        _ => {
            let mut t0 = 1.0;
            let mut t1 = v;
            for _ in 2..=k {
                let t2 = 2.0 * v * t1 - t0;
                t0 = t1;
                t1 = t2;
            }
            t1
        }
    }
}

/// Integrate `f` over `[a, b]` with composite Simpson using [`SIMPSON_STEPS`].
pub fn simpson(a: f64, b: f64, mut f: impl FnMut(f64) -> f64) -> f64 {
    let n = SIMPSON_STEPS;
    let h = (b - a) / n as f64;
    let mut sum = f(a) + f(b);
    for i in 1..n {
        let x = a + h * i as f64;
        sum += if i % 2 == 1 { 4.0 * f(x) } else { 2.0 * f(x) };
    }
    sum * h / 3.0
}

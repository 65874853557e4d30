//! Significance of the number of shared hashes between two sketches.
//!
//! Under the null model each of the `denom` hashes walked by the comparison is shared
//! by chance with probability `r`, derived from the two sequence lengths and the size
//! of the k-mer space. The p-value is the binomial upper tail `P(X >= x)`, computed
//! through the regularised incomplete beta function.

const LANCZOS_G: f64 = 7.0;
const LANCZOS_COEF: [f64; 9] = [
    0.999_999_999_999_809_93,
    676.520_368_121_885_1,
    -1_259.139_216_722_402_8,
    771.323_428_777_653_13,
    -176.615_029_162_140_59,
    12.507_343_278_686_905,
    -0.138_571_095_265_720_12,
    9.984_369_578_019_571_6e-6,
    1.505_632_735_149_311_6e-7,
];

const CF_EPSILON: f64 = 1e-15;
const CF_TINY: f64 = 1e-300;
const CF_MAX_ITER: usize = 100_000;

/// Probability of observing at least `x` shared hashes out of `denom` by chance.
pub fn p_value(x: u64, length_ref: u64, length_qry: u64, kmer_space: f64, denom: u64) -> f64 {
    if x == 0 {
        return 1.0;
    }

    let p_ref = 1.0 / (1.0 + kmer_space / length_ref as f64);
    let p_qry = 1.0 / (1.0 + kmer_space / length_qry as f64);

    let r = p_ref * p_qry / (p_ref + p_qry - p_ref * p_qry);

    // both lengths zero
    let r = if r.is_finite() { r } else { 0.0 };

    binomial_upper_tail(x, denom, r)
}

/// `P(X >= x)` for `X ~ Binomial(n, p)`.
pub fn binomial_upper_tail(x: u64, n: u64, p: f64) -> f64 {
    if x == 0 {
        return 1.0;
    }

    if x > n || p <= 0.0 {
        return 0.0;
    }

    if p >= 1.0 {
        return 1.0;
    }

    regularized_incomplete_beta(x as f64, (n - x + 1) as f64, p).clamp(0.0, 1.0)
}

/// Regularised incomplete beta function `I_x(a, b)` for `a, b > 0`.
pub fn regularized_incomplete_beta(a: f64, b: f64, x: f64) -> f64 {
    if x <= 0.0 {
        return 0.0;
    }

    if x >= 1.0 {
        return 1.0;
    }

    let ln_front = ln_gamma(a + b) - ln_gamma(a) - ln_gamma(b) + a * x.ln() + b * (-x).ln_1p();

    // the continued fraction converges quickly on this side of the mean
    if x < (a + 1.0) / (a + b + 2.0) {
        ln_front.exp() * beta_continued_fraction(a, b, x) / a
    } else {
        1.0 - ln_front.exp() * beta_continued_fraction(b, a, 1.0 - x) / b
    }
}

/// Continued fraction for the incomplete beta function (modified Lentz).
fn beta_continued_fraction(a: f64, b: f64, x: f64) -> f64 {
    let qab = a + b;
    let qap = a + 1.0;
    let qam = a - 1.0;

    let mut c = 1.0;
    let mut d = guard_tiny(1.0 - qab * x / qap).recip();
    let mut h = d;

    for m in 1..=CF_MAX_ITER {
        let m = m as f64;
        let m2 = 2.0 * m;

        // even step
        let aa = m * (b - m) * x / ((qam + m2) * (a + m2));
        d = guard_tiny(1.0 + aa * d).recip();
        c = guard_tiny(1.0 + aa / c);
        h *= d * c;

        // odd step
        let aa = -(a + m) * (qab + m) * x / ((a + m2) * (qap + m2));
        d = guard_tiny(1.0 + aa * d).recip();
        c = guard_tiny(1.0 + aa / c);
        let delta = d * c;
        h *= delta;

        if (delta - 1.0).abs() < CF_EPSILON {
            break;
        }
    }

    h
}

#[inline]
fn guard_tiny(v: f64) -> f64 {
    if v.abs() < CF_TINY { CF_TINY } else { v }
}

/// Natural log of the gamma function (Lanczos approximation).
pub fn ln_gamma(x: f64) -> f64 {
    if x < 0.5 {
        // reflection formula
        return (std::f64::consts::PI / (std::f64::consts::PI * x).sin()).ln() - ln_gamma(1.0 - x);
    }

    let x = x - 1.0;
    let mut sum = LANCZOS_COEF[0];
    for (i, coef) in LANCZOS_COEF.iter().enumerate().skip(1) {
        sum += coef / (x + i as f64);
    }

    let t = x + LANCZOS_G + 0.5;
    0.5 * (2.0 * std::f64::consts::PI).ln() + (x + 0.5) * t.ln() - t + sum.ln()
}

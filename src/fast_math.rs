const COEFF_0: f32 = 1.0;
const COEFF_1: f32 = 4.831794110;
const COEFF_2: f32 = 0.143440676;
const COEFF_3: f32 = 0.019890581;
const COEFF_4: f32 = 0.006935931;
const ONEBYLOG2: f32 = std::f32::consts::LOG2_E;
const OFFSET_F32: i32 = 127;
const FRACTION_F32: u32 = 23;
const MIN_VAL: f32 = -87.0;
const MAX_VAL: f32 = 88.0;

/// Log of zero probability.
pub const LOG_ZERO: f64 = f64::NEG_INFINITY;

/// Smallest positive normal `f32`, added to linear probabilities before taking the log so a zero
/// entry maps to a very small finite log-probability instead of `-inf`.
pub const PROB_FLOOR: f64 = f32::MIN_POSITIVE as f64;

/// Fast approximation of exp() as shown by Kopcynski 2017:
/// https://eldorado.tu-dortmund.de/bitstream/2003/36203/1/Dissertation_Kopczynski.pdf
///
/// The integer part of `input / ln 2` goes straight into the exponent bits, the fractional part
/// through a fourth order polynomial.
pub fn fast_exp(input: f32) -> f32 {
    if input <= MIN_VAL {
        return 0.0;
    }
    if input >= MAX_VAL {
        return f32::INFINITY;
    }

    let x = ONEBYLOG2 * input;
    let whole = x as i32;
    let frac = x - whole as f32;

    let scale = f32::from_bits(((whole + OFFSET_F32) as u32) << FRACTION_F32);

    let mut poly = frac * COEFF_4;
    poly += COEFF_3;
    poly *= frac;
    poly += COEFF_2;
    poly *= (frac + COEFF_1) * frac;
    poly += COEFF_0;

    scale * poly
}

/// Exponent used when log-probabilities only need to be ranked or accumulated for pruning.
#[inline]
pub fn rank_exp(x: f64) -> f64 {
    if cfg!(feature = "fastexp") {
        fast_exp(x as f32) as f64
    } else {
        x.exp()
    }
}

/// `log(exp(x) + exp(y))` without leaving the log domain.
#[inline]
pub fn log_sum_exp(x: f64, y: f64) -> f64 {
    if x == LOG_ZERO {
        return y;
    }
    if y == LOG_ZERO {
        return x;
    }
    if x < y {
        y + (x - y).exp().ln_1p()
    } else {
        x + (y - x).exp().ln_1p()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fast_exp_tracks_exp() {
        for &x in &[-20.0f32, -5.5, -1.0, -0.25, 0.0, 0.5, 3.0] {
            let exact = x.exp();
            let approx = fast_exp(x);
            assert!(((approx - exact) / exact).abs() < 5e-3, "{} vs {}", approx, exact);
        }
        assert_eq!(fast_exp(-1000.0), 0.0);
    }

    #[test]
    fn log_sum_exp_handles_log_zero() {
        assert_eq!(log_sum_exp(LOG_ZERO, LOG_ZERO), LOG_ZERO);
        assert_eq!(log_sum_exp(LOG_ZERO, -2.0), -2.0);
        assert_eq!(log_sum_exp(-3.0, LOG_ZERO), -3.0);

        let merged = log_sum_exp(0.25f64.ln(), 0.5f64.ln());
        assert!((merged - 0.75f64.ln()).abs() < 1e-12);
    }
}

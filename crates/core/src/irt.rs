//! 3-parameter-logistic IRT response model and its Newton-Raphson MAP
//! ability estimator. Pure, deterministic, side-effect-free.

const THETA_MIN: f64 = -4.0;
const THETA_MAX: f64 = 4.0;
const STEP_CLIP: f64 = 1.0;
const CONVERGENCE_EPS: f64 = 1e-3;
const HESSIAN_EPS: f64 = 1e-8;
const PROB_EPS: f64 = 1e-6;
const INFO_EPS: f64 = 1e-8;

/// A single (discrimination, difficulty, pseudo-guessing) item parameter
/// triple, all of which may be absent.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct IrtParams {
    pub a: Option<f64>,
    pub b: Option<f64>,
    pub c: Option<f64>,
}

impl IrtParams {
    pub fn new(a: f64, b: f64, c: f64) -> Self {
        Self {
            a: Some(a),
            b: Some(b),
            c: Some(c),
        }
    }

    pub fn is_complete(&self) -> bool {
        self.a.is_some() && self.b.is_some() && self.c.is_some()
    }
}

/// A single observed response used to update θ: item parameters plus the
/// binary outcome.
#[derive(Debug, Clone, Copy)]
pub struct Observation {
    pub params: IrtParams,
    pub correct: bool,
}

fn clamp_theta(theta: f64) -> f64 {
    theta.clamp(THETA_MIN, THETA_MAX)
}

/// P(correct | θ) under the 3PL model: c + (1−c)·σ(a(θ−b)).
///
/// Returns 0.5 if any parameter is missing. Clamps the logistic argument at
/// ±20 to stay overflow-safe.
pub fn p_3pl(theta: f64, params: IrtParams) -> f64 {
    let (Some(a), Some(b), Some(c)) = (params.a, params.b, params.c) else {
        return 0.5;
    };
    let z = a * (theta - b);
    let sigma = if z > 20.0 {
        1.0
    } else if z < -20.0 {
        0.0
    } else {
        1.0 / (1.0 + (-z).exp())
    };
    c + (1.0 - c) * sigma
}

/// Fisher information I(θ) = (dP/dθ)² / (P(1−P)).
///
/// Returns 0 if any parameter is missing, if P or (1−P) falls below 1e-6, or
/// if (1−c) falls below 1e-6.
pub fn fisher_info(theta: f64, params: IrtParams) -> f64 {
    let (Some(a), Some(_b), Some(c)) = (params.a, params.b, params.c) else {
        return 0.0;
    };
    if (1.0 - c) < PROB_EPS {
        return 0.0;
    }
    let p = p_3pl(theta, params);
    if p < PROB_EPS || (1.0 - p) < PROB_EPS {
        return 0.0;
    }
    let l = (p - c) / (1.0 - c);
    let dp_dtheta = (1.0 - c) * a * l * (1.0 - l);
    (dp_dtheta * dp_dtheta) / (p * (1.0 - p))
}

/// Posterior mode θ̂ and its standard error, via Newton-Raphson on the
/// log-posterior. `prior_var = None` gives the MLE (no prior term).
pub fn update_theta(
    theta0: f64,
    responses: &[Observation],
    prior_var: Option<f64>,
    max_iter: u32,
) -> (f64, f64) {
    let mut theta = clamp_theta(theta0);
    let scored: Vec<Observation> = responses
        .iter()
        .copied()
        .filter(|r| r.params.is_complete())
        .collect();

    if scored.is_empty() {
        return (theta, 1.0);
    }

    for _ in 0..max_iter {
        let mut gradient = 0.0;
        let mut hessian = match prior_var {
            Some(var) => -1.0 / var,
            None => 0.0,
        };
        if let Some(var) = prior_var {
            gradient -= theta / var;
        }

        for obs in &scored {
            let params = obs.params;
            let (a, _b, c) = (params.a.unwrap(), params.b.unwrap(), params.c.unwrap());
            let p = p_3pl(theta, params);
            if p < PROB_EPS || (1.0 - p) < PROB_EPS {
                continue;
            }
            let l = (p - c) / (1.0 - c).max(PROB_EPS);
            let dp_dtheta = (1.0 - c) * a * l * (1.0 - l);
            let y = if obs.correct { 1.0 } else { 0.0 };
            gradient += (y - p) * dp_dtheta / (p * (1.0 - p));
            hessian -= (dp_dtheta * dp_dtheta) * (1.0 / p + 1.0 / (1.0 - p));
        }

        if hessian.abs() < HESSIAN_EPS {
            break;
        }

        let mut step = -gradient / hessian;
        step = step.clamp(-STEP_CLIP, STEP_CLIP);
        theta = clamp_theta(theta + step);

        if step.abs() < CONVERGENCE_EPS {
            break;
        }
    }

    let info_total: f64 = scored.iter().map(|obs| fisher_info(theta, obs.params)).sum();
    let prior_info = prior_var.map(|var| 1.0 / var).unwrap_or(0.0);
    let total = info_total + prior_info;
    let se = if total <= INFO_EPS { 1.0 } else { 1.0 / total.sqrt() };

    (theta, se)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(a: f64, b: f64, c: f64) -> IrtParams {
        IrtParams::new(a, b, c)
    }

    #[test]
    fn p_3pl_missing_params_returns_half() {
        assert_eq!(p_3pl(0.0, IrtParams::default()), 0.5);
    }

    #[test]
    fn p_3pl_is_bounded_by_guessing_and_one() {
        let p = params(1.0, 0.0, 0.25);
        for theta in [-4.0, -1.0, 0.0, 1.0, 4.0] {
            let v = p_3pl(theta, p);
            assert!(v >= 0.25 - 1e-12 && v <= 1.0 + 1e-12);
        }
    }

    #[test]
    fn p_3pl_monotone_increasing_in_theta_for_positive_discrimination() {
        let p = params(1.2, 0.0, 0.2);
        let mut prev = p_3pl(-4.0, p);
        for i in 1..=40 {
            let theta = -4.0 + i as f64 * 0.2;
            let cur = p_3pl(theta, p);
            assert!(cur >= prev - 1e-12);
            prev = cur;
        }
    }

    #[test]
    fn p_3pl_clamps_overflow_arguments() {
        let p = params(10.0, -100.0, 0.1);
        assert!((p_3pl(4.0, p) - 1.0).abs() < 1e-9);
        let q = params(10.0, 100.0, 0.1);
        assert!((p_3pl(-4.0, q) - 0.1).abs() < 1e-9);
    }

    #[test]
    fn fisher_info_missing_params_is_zero() {
        assert_eq!(fisher_info(0.0, IrtParams::default()), 0.0);
    }

    #[test]
    fn fisher_info_is_nonnegative() {
        let p = params(1.0, 0.0, 0.2);
        for theta in [-3.0, 0.0, 3.0] {
            assert!(fisher_info(theta, p) >= 0.0);
        }
    }

    #[test]
    fn update_theta_empty_responses_returns_clamped_prior() {
        let (theta, se) = update_theta(10.0, &[], Some(1.0), 25);
        assert_eq!(theta, 4.0);
        assert_eq!(se, 1.0);
    }

    #[test]
    fn update_theta_correct_answer_moves_theta_up() {
        let obs = Observation {
            params: params(1.0, 0.0, 0.2),
            correct: true,
        };
        let (theta, se) = update_theta(0.0, &[obs], Some(1.0), 25);
        assert!(theta >= 0.0);
        assert!(se > 0.0 && se <= 1.0);
    }

    #[test]
    fn update_theta_incorrect_answer_moves_theta_down() {
        let obs = Observation {
            params: params(1.0, 0.0, 0.2),
            correct: false,
        };
        let (theta, _se) = update_theta(0.0, &[obs], Some(1.0), 25);
        assert!(theta <= 0.0);
    }

    #[test]
    fn update_theta_ignores_incomplete_observations() {
        let obs = Observation {
            params: IrtParams {
                a: Some(1.0),
                b: None,
                c: Some(0.2),
            },
            correct: true,
        };
        let (theta, se) = update_theta(0.25, &[obs], Some(1.0), 25);
        assert_eq!(theta, 0.25);
        assert_eq!(se, 1.0);
    }

    #[test]
    fn update_theta_clamps_final_value() {
        let obs: Vec<Observation> = (0..50)
            .map(|_| Observation {
                params: params(2.0, -3.9, 0.1),
                correct: true,
            })
            .collect();
        let (theta, _se) = update_theta(0.0, &obs, Some(1.0), 25);
        assert!(theta <= THETA_MAX);
    }
}

use fractality_core::Easing;
use std::f32::consts::PI;

/// Maps linear progress `t` in `[0, 1]` through `easing`. Endpoints are exact.
pub fn ease(easing: Easing, t: f32) -> f32 {
    let t = t.clamp(0.0, 1.0);
    if t == 0.0 || t == 1.0 {
        return t;
    }
    match easing {
        Easing::Linear => t,
        Easing::EaseInQuad => t * t,
        Easing::EaseOutQuad => t * (2.0 - t),
        Easing::EaseInOutQuad => {
            if t < 0.5 {
                2.0 * t * t
            } else {
                -1.0 + (4.0 - 2.0 * t) * t
            }
        }
        Easing::EaseOutCubic => 1.0 - (1.0 - t).powi(3),
        Easing::EaseInOutCubic => {
            if t < 0.5 {
                4.0 * t * t * t
            } else {
                1.0 - (-2.0 * t + 2.0).powi(3) / 2.0
            }
        }
        Easing::EaseInOutSine => -((PI * t).cos() - 1.0) / 2.0,
        Easing::EaseOutElastic => {
            let c4 = (2.0 * PI) / 3.0;
            2f32.powf(-10.0 * t) * ((t * 10.0 - 0.75) * c4).sin() + 1.0
        }
    }
}

/// Like [`ease`], but the curve's deviation from linear is multiplied by
/// `amplitude`. `0` gives linear progress, `1` the plain curve.
pub fn ease_scaled(easing: Easing, t: f32, amplitude: f32) -> f32 {
    let t = t.clamp(0.0, 1.0);
    t + (ease(easing, t) - t) * amplitude
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [Easing; 8] = [
        Easing::Linear,
        Easing::EaseInQuad,
        Easing::EaseOutQuad,
        Easing::EaseInOutQuad,
        Easing::EaseOutCubic,
        Easing::EaseInOutCubic,
        Easing::EaseInOutSine,
        Easing::EaseOutElastic,
    ];

    #[test]
    fn test_endpoints_are_exact() {
        for easing in ALL {
            assert_eq!(ease(easing, 0.0), 0.0, "{easing:?}");
            assert_eq!(ease(easing, 1.0), 1.0, "{easing:?}");
            assert_eq!(ease(easing, 1.5), 1.0, "{easing:?}");
        }
    }

    #[test]
    fn test_midpoints() {
        assert!((ease(Easing::EaseInOutCubic, 0.5) - 0.5).abs() < 1e-6);
        assert!((ease(Easing::EaseInOutSine, 0.5) - 0.5).abs() < 1e-6);
        assert_eq!(ease(Easing::EaseOutQuad, 0.5), 0.75);
    }

    #[test]
    fn test_elastic_overshoots_and_amplitude_scales_it() {
        let peak = (1..100)
            .map(|i| ease(Easing::EaseOutElastic, i as f32 / 100.0))
            .fold(f32::MIN, f32::max);
        assert!(peak > 1.0);

        assert_eq!(ease_scaled(Easing::EaseOutElastic, 0.3, 0.0), 0.3);
        let full = ease_scaled(Easing::EaseOutElastic, 0.3, 1.0);
        assert!((full - ease(Easing::EaseOutElastic, 0.3)).abs() < 1e-6);
        let half = ease_scaled(Easing::EaseOutElastic, 0.3, 0.5);
        assert!((half - (0.3 + full) / 2.0).abs() < 1e-6);
    }
}

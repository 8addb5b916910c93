use palette::{white_point::D65, FromColor, Lab, Srgb};

/// sRGB bytes to CIE L*a*b* (D65), returned as `[l, a, b]`.
pub fn rgb_to_lab(rgb: [u8; 3]) -> [f32; 3] {
    let srgb = Srgb::new(
        rgb[0] as f32 / 255.0,
        rgb[1] as f32 / 255.0,
        rgb[2] as f32 / 255.0,
    );
    let lab: Lab<D65, f32> = Lab::from_color(srgb);
    [lab.l, lab.a, lab.b]
}

/// CIE L*a*b* (D65) to sRGB, each channel clipped to `[0, 1]`.
pub fn lab_to_rgb(l: f32, a: f32, b: f32) -> [f32; 3] {
    let srgb: Srgb<f32> = Srgb::from_color(Lab::<D65, f32>::new(l, a, b));
    [
        clip_unit(srgb.red),
        clip_unit(srgb.green),
        clip_unit(srgb.blue),
    ]
}

/// `[0, 1]` channel values to rounded bytes.
pub fn unit_to_byte(rgb: [f32; 3]) -> [u8; 3] {
    rgb.map(|c| (clip_unit(c) * 255.0).round() as u8)
}

fn clip_unit(v: f32) -> f32 {
    if v.is_nan() {
        0.0
    } else {
        v.clamp(0.0, 1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn white_and_black_lightness() {
        let [l, a, b] = rgb_to_lab([255, 255, 255]);
        assert!((l - 100.0).abs() < 0.1);
        assert!(a.abs() < 0.1 && b.abs() < 0.1);

        let [l, _, _] = rgb_to_lab([0, 0, 0]);
        assert!(l.abs() < 0.1);
    }

    #[test]
    fn pure_red_has_positive_a() {
        let [l, a, b] = rgb_to_lab([255, 0, 0]);
        assert!((l - 53.2).abs() < 0.5);
        assert!((a - 80.1).abs() < 1.0);
        assert!((b - 67.2).abs() < 1.0);
    }

    #[test]
    fn out_of_gamut_lab_is_clipped() {
        let rgb = lab_to_rgb(50.0, 127.0, -127.0);
        assert!(rgb.iter().all(|c| (0.0..=1.0).contains(c)));
    }
}

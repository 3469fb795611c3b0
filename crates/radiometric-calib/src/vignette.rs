//! Vignetting correction function generation
//!
//! pcomb takes its correction function as Radiance .cal source. The function
//! is a fitted falloff polynomial in the tangent domain, evaluated on the
//! angle from the fisheye center, so the source has to be regenerated for
//! each configured center offset.

/// Render the vignetting correction .cal source for a fisheye centered at
/// `center_offset` pixels from the frame center.
pub fn vignette_cal(center_offset: (i32, i32)) -> String {
    let (dx, dy) = center_offset;
    format!(
        "sq(x):x*x;\n\
         td(x):tan(PI*x/180);\n\
         SigmaVig8_0(deg) : 1+0.002*td(deg*.991)-0.0001*sq(td(deg*.991));\n\
         centx=xmax/2+({dx}); centy=ymax/2+({dy});\n\
         xne=(x-centx)/(ymax/2); yne=(y-centy)/(ymax/2);\n\
         deg_cent=90*sqrt(sq(xne) + sq(yne));\n\
         corr=1.0/SigmaVig8_0(deg_cent);\n\
         ro=corr*ri(1);go=corr*gi(1);bo=corr*bi(1);\n"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_offsets_are_substituted() {
        let cal = vignette_cal((-10, 5));
        assert!(cal.contains("centx=xmax/2+(-10)"));
        assert!(cal.contains("centy=ymax/2+(5)"));
    }

    #[test]
    fn test_every_statement_is_terminated() {
        for line in vignette_cal((0, 0)).lines() {
            assert!(line.trim_end().ends_with(';'), "unterminated: {line}");
        }
    }

    #[test]
    fn test_falloff_polynomial_is_fixed() {
        let cal = vignette_cal((3, -7));
        assert!(cal.contains("1+0.002*td(deg*.991)-0.0001*sq(td(deg*.991))"));
        assert!(cal.contains("corr=1.0/SigmaVig8_0(deg_cent)"));
    }
}

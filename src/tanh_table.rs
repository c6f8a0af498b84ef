//! Fixed-point approximation tables for the saturating tanh nonlinearity.
//!
//! An offline, side-effect-free subsystem producing the deployment tables the
//! embedded fixed-point runtime consumes. The table samples the exact
//! nonlinearity on `[0, max_x]` at a uniform step; runtime evaluation is a
//! nearest-index lookup plus one Newton-style correction
//! (`y' = y + dx*dy*(1 - y*dx)` with `dy = 1 - y^2`, the exact tanh
//! derivative), not linear interpolation. This keeps the table small while
//! bounding the error.
//!
//! Three evaluation paths share the contract that floating and fixed-point
//! results agree within the deployment tolerance:
//!
//! - [`TanhTable::approximate`]: float reference (float table)
//! - [`TanhTable::approximate_q15`]: float arithmetic over the Q15-quantized
//!   table and step, the values the deployment target ships
//! - [`TanhTable::tanh_q15`]: the integer Q15 datapath itself

use std::io::{self, Write};

use crate::error::{DenoiseError, Result};

/// Default domain half-width; contributions beyond saturate in 16-bit
/// fixed point.
pub const DEFAULT_MAX_X: f32 = 8.0;
/// Default sampling step.
pub const DEFAULT_DELTA_X: f32 = 0.125;
/// Fractional bits of the fixed-point representation.
pub const Q15_FRAC_BITS: u32 = 15;

const Q15_ONE: f32 = (1i32 << Q15_FRAC_BITS) as f32;

/// Quantize to Q15, rounding and saturating at the representable bounds.
pub fn quantize_q15(x: f32) -> i16 {
    ((x * Q15_ONE).round() as i32).clamp(i16::MIN as i32, i16::MAX as i32) as i16
}

/// Emitted table representation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableFormat {
    /// `float` entries with `f`-suffixed literals.
    Float,
    /// `int16_t` entries, Q15, `_S16`-postfixed macro names.
    Q15,
}

/// Error statistics of an approximation path against the exact nonlinearity.
#[derive(Debug, Clone, Copy)]
pub struct ValidationStats {
    pub mean_abs_err: f32,
    pub max_abs_err: f32,
}

impl std::fmt::Display for ValidationStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "MAE={:.3e} max_err={:.3e}",
            self.mean_abs_err, self.max_abs_err
        )
    }
}

/// Count elements of two tensors differing by more than `tol`.
///
/// The parity acceptance check between the fixed-point and floating
/// runtimes: the result is a disagreement count, not a pass/fail bool.
pub fn disagreements(a: &[f32], b: &[f32], tol: f32) -> usize {
    assert_eq!(a.len(), b.len(), "tensors must have the same shape");
    a.iter()
        .zip(b.iter())
        .filter(|(&x, &y)| (x - y).abs() > tol)
        .count()
}

/// Sampled tanh table plus its Q15 quantization. Immutable after
/// generation; consumed read-only at inference time.
#[derive(Debug, Clone)]
pub struct TanhTable {
    max_x: f32,
    delta_x: f32,
    delta_x_q15: i16,
    scale_fac: i32,
    samples: Vec<f32>,
    samples_q15: Vec<i16>,
}

impl TanhTable {
    /// Sample `tanh(i * delta_x)` for `i = 0 ..= floor(max_x / delta_x)` and
    /// quantize the same sample set to Q15.
    ///
    /// `delta_x` must be the reciprocal of a whole number so that the
    /// runtime scale factor `1/delta_x` is an exact integer.
    pub fn generate(max_x: f32, delta_x: f32) -> Result<Self> {
        if !(max_x > 0.0) || !(delta_x > 0.0) || delta_x > max_x {
            return Err(DenoiseError::InvalidConfig(format!(
                "bad table domain: max_x {} delta_x {}",
                max_x, delta_x
            )));
        }
        let scale_fac = (1.0 / delta_x).round() as i32;
        if scale_fac < 1 || (scale_fac as f32 * delta_x - 1.0).abs() > 1e-6 {
            return Err(DenoiseError::InvalidConfig(format!(
                "delta_x {} is not the reciprocal of an integer",
                delta_x
            )));
        }

        let size = (max_x / delta_x).floor() as usize + 1;
        let samples: Vec<f32> = (0..size).map(|i| (i as f32 * delta_x).tanh()).collect();
        let samples_q15 = samples.iter().map(|&y| quantize_q15(y)).collect();

        Ok(Self {
            max_x,
            delta_x,
            delta_x_q15: quantize_q15(delta_x),
            scale_fac,
            samples,
            samples_q15,
        })
    }

    pub fn size(&self) -> usize {
        self.samples.len()
    }

    pub fn max_index(&self) -> usize {
        self.samples.len() - 1
    }

    pub fn max_x(&self) -> f32 {
        self.max_x
    }

    pub fn delta_x(&self) -> f32 {
        self.delta_x
    }

    /// Runtime index scale, `1/delta_x` as an exact integer.
    pub fn scale_fac(&self) -> i32 {
        self.scale_fac
    }

    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    pub fn samples_q15(&self) -> &[i16] {
        &self.samples_q15
    }

    /// Float reference approximation. Deterministic, no side effects.
    pub fn approximate(&self, x: f32) -> f32 {
        let sign = if x < 0.0 { -1.0 } else { 1.0 };
        let a = sign * x;
        let idx = ((0.5 + a * self.scale_fac as f32).floor() as i64)
            .clamp(0, self.max_index() as i64) as usize;
        let dx = a - self.delta_x * idx as f32;
        let y = self.samples[idx];
        let dy = 1.0 - y * y;
        sign * (y + dx * dy * (1.0 - y * dx))
    }

    /// Same datapath evaluated through the Q15-quantized table and step,
    /// the values the deployment target ships.
    pub fn approximate_q15(&self, x: f32) -> f32 {
        let sign = if x < 0.0 { -1.0 } else { 1.0 };
        let a = sign * x;
        let idx = ((0.5 + a * self.scale_fac as f32).floor() as i64)
            .clamp(0, self.max_index() as i64) as usize;
        let delta = self.delta_x_q15 as f32 / Q15_ONE;
        let dx = a - delta * idx as f32;
        let y = self.samples_q15[idx] as f32 / Q15_ONE;
        let dy = 1.0 - y * y;
        sign * (y + dx * dy * (1.0 - y * dx))
    }

    /// Integer Q15 datapath: `x` in Q3.15, result in Q15.
    ///
    /// The correction term is carried in Q31/Q1.30 and truncated back to
    /// Q15, matching the embedded implementation bit for bit.
    pub fn tanh_q15(&self, x: i32) -> i16 {
        let (sign, x) = if x < 0 { (-1i32, -x) } else { (1, x) };
        // Saturate at the sampled domain; tanh is flat beyond it.
        let x = x.min((self.max_x * Q15_ONE) as i32);
        let i = ((0x4000i64 + self.scale_fac as i64 * x as i64) >> 15)
            .clamp(0, self.max_index() as i64) as i32;
        let x = x - self.delta_x_q15 as i32 * i; // Q15 residual
        let y = self.samples_q15[i as usize] as i32; // Q15
        let one_q31 = i32::MAX;
        let dy = one_q31 - ((y * y) << 1); // Q31: 1 - y^2
        let one_xy = (one_q31 >> 1) - y * x; // Q1.30: 1 - y*x
        let t = ((x as i64 * dy as i64) >> 15) as i32; // Q31: dx*dy
        let corr = ((one_xy as i64 * t as i64) >> 31) as i32; // Q1.30
        (sign * (y + (corr >> 15))) as i16
    }

    /// Integer sigmoid via the tanh identity:
    /// `sigmoid(x) = 0.5 + 0.5 * tanh(x/2)`.
    pub fn sigmoid_q15(&self, x: i32) -> i16 {
        0x4000 + (self.tanh_q15(x >> 1) >> 1)
    }

    /// Measure the float reference path against exact tanh on a dense grid
    /// over `[-max_x, max_x]`.
    pub fn validate(&self, num_points: usize) -> ValidationStats {
        self.measure(num_points, |x| self.approximate(x))
    }

    /// Measure the Q15 deployment path against exact tanh on a dense grid.
    pub fn validate_q15(&self, num_points: usize) -> ValidationStats {
        self.measure(num_points, |x| self.approximate_q15(x))
    }

    fn measure(&self, num_points: usize, f: impl Fn(f32) -> f32) -> ValidationStats {
        assert!(num_points >= 2);
        let mut sum = 0.0f64;
        let mut max = 0.0f32;
        for k in 0..num_points {
            let x = -self.max_x + 2.0 * self.max_x * k as f32 / (num_points - 1) as f32;
            let err = (f(x) - x.tanh()).abs();
            sum += err as f64;
            max = max.max(err);
        }
        ValidationStats {
            mean_abs_err: (sum / num_points as f64) as f32,
            max_abs_err: max,
        }
    }

    /// Emit the textual table definition consumed by the embedded runtime.
    ///
    /// Both variants are derived from the same sample set; only the numeric
    /// representation differs.
    pub fn write_table_source<W: Write>(&self, w: &mut W, format: TableFormat) -> io::Result<()> {
        let (file_name, postfix) = match format {
            TableFormat::Float => ("tanh_table.h", ""),
            TableFormat::Q15 => ("tanh_table_S16.h", "_S16"),
        };
        writeln!(w, "//  {}", file_name)?;
        writeln!(w, "//")?;
        writeln!(w, "//  Generated by gen_tanh_table. Do not edit.")?;
        writeln!(w, "//")?;
        writeln!(w, "#include <stdint.h>")?;
        writeln!(w, "#include \"common_def.h\"")?;
        writeln!(w)?;
        writeln!(w, "#define TANH_TABLE_SIZE{} {}", postfix, self.size())?;
        writeln!(w, "#define TANH_TABLE_MAXINDEX{} {}", postfix, self.max_index())?;
        match format {
            TableFormat::Float => {
                writeln!(w, "#define TANH_DELTAX{} {:?}f", postfix, self.delta_x)?
            }
            TableFormat::Q15 => writeln!(w, "#define TANH_DELTAX{} {}", postfix, self.delta_x_q15)?,
        }
        writeln!(w, "#define TANH_SCALEFAC{} {}", postfix, self.scale_fac)?;
        writeln!(w)?;

        let type_name = match format {
            TableFormat::Float => "float",
            TableFormat::Q15 => "int16_t",
        };
        writeln!(
            w,
            "static const {} tanh_table{}[{}] = {{",
            type_name,
            postfix,
            self.size()
        )?;
        for chunk in (0..self.size()).collect::<Vec<_>>().chunks(8) {
            let row: Vec<String> = chunk
                .iter()
                .map(|&j| match format {
                    TableFormat::Float => format!("{:?}f", self.samples[j]),
                    TableFormat::Q15 => format!("{}", self.samples_q15[j]),
                })
                .collect();
            writeln!(w, "    {},", row.join(", "))?;
        }
        writeln!(w, "}};")?;
        Ok(())
    }
}

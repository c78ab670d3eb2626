//! Stateless operations over tensors.
//!
//! Every binary operation checks the shape rule it depends on and fails with
//! [`NetworkError::InconsistentSize`] naming the operation. Matrix products
//! are applied matrix by matrix over `(depth1, depth2)`.

use super::Tensor;
use crate::error::{NetworkError, Result};
use crate::utils::rng::NetworkRng;

/// Whether the kernel is reversed before correlating.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KernelMode {
    Std,
    Flip,
}

/// Zero padding applied around the input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PadMode {
    /// No padding, output shrinks by `filter - 1`.
    Valid,
    /// Pad by `filter - 1` on each side, output grows by `filter - 1`.
    Full,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConvolutionMode {
    pub kernel: KernelMode,
    pub padding: PadMode,
}

impl ConvolutionMode {
    /// Flipped kernel with valid padding, used by the forward pass.
    pub const FORWARD: Self = Self {
        kernel: KernelMode::Flip,
        padding: PadMode::Valid,
    };
    /// Plain correlation with full padding, used to propagate errors back.
    pub const BACKWARD: Self = Self {
        kernel: KernelMode::Std,
        padding: PadMode::Full,
    };
    /// Plain correlation with valid padding, used for weight gradients.
    pub const UPDATE: Self = Self {
        kernel: KernelMode::Std,
        padding: PadMode::Valid,
    };

    fn padding_for(&self, filter_size: usize) -> usize {
        match self.padding {
            PadMode::Valid => 0,
            PadMode::Full => filter_size.saturating_sub(1),
        }
    }

    /// Output extent along one axis, or `None` when the filter does not fit.
    fn output_size(&self, input: usize, filter: usize) -> Option<usize> {
        let padded = input + 2 * self.padding_for(filter);
        if filter == 0 || filter > padded {
            None
        } else {
            Some(padded - filter + 1)
        }
    }
}

fn check_same(a: &Tensor, b: &Tensor, op: &'static str) -> Result<()> {
    if a.same_shape(b) {
        Ok(())
    } else {
        Err(NetworkError::InconsistentSize(op))
    }
}

fn zip_with<F: Fn(f32, f32) -> f32>(a: &Tensor, b: &Tensor, f: F) -> Tensor {
    let mut out = a.clone();
    out.data_mut()
        .iter_mut()
        .zip(b.data().iter())
        .for_each(|(x, y)| *x = f(*x, *y));
    out
}

/// Element-wise sum. Shapes must match.
pub fn add(a: &Tensor, b: &Tensor) -> Result<Tensor> {
    check_same(a, b, "add")?;
    Ok(zip_with(a, b, |x, y| x + y))
}

/// Element-wise difference `a - b`.
pub fn sub(a: &Tensor, b: &Tensor) -> Result<Tensor> {
    check_same(a, b, "sub")?;
    Ok(zip_with(a, b, |x, y| x - y))
}

/// Element-wise (Hadamard) product.
pub fn elemul(a: &Tensor, b: &Tensor) -> Result<Tensor> {
    check_same(a, b, "elemul")?;
    Ok(zip_with(a, b, |x, y| x * y))
}

/// Element-wise quotient `a / b`.
pub fn elediv(a: &Tensor, b: &Tensor) -> Result<Tensor> {
    check_same(a, b, "elediv")?;
    Ok(zip_with(a, b, |x, y| x / y))
}

/// Element-wise combination with a caller supplied function.
pub fn binary_operator<F>(a: &Tensor, b: &Tensor, f: F) -> Result<Tensor>
where
    F: Fn(f32, f32) -> f32,
{
    check_same(a, b, "binary_operator")?;
    Ok(zip_with(a, b, f))
}

/// Copy of `a` multiplied by `factor`.
pub fn scale(a: &Tensor, factor: f32) -> Tensor {
    let mut out = a.clone();
    out *= factor;
    out
}

/// `a + value` on every element.
pub fn plus(a: &Tensor, value: f32) -> Tensor {
    let mut out = a.clone();
    out.map_inplace(|v| v + value);
    out
}

/// `value - a` on every element.
pub fn minus(value: f32, a: &Tensor) -> Tensor {
    let mut out = a.clone();
    out.map_inplace(|v| value - v);
    out
}

/// Element-wise square root.
pub fn sqrt(a: &Tensor) -> Tensor {
    let mut out = a.clone();
    out.map_inplace(f32::sqrt);
    out
}

/// Each matrix replaced by its sum, spread over every element.
pub fn uniform_sum(a: &Tensor) -> Tensor {
    let mut out = a.clone();
    let len = out.matrix_size();
    if len > 0 {
        for matrix in out.data_mut().chunks_exact_mut(len) {
            let total: f32 = matrix.iter().sum();
            matrix.iter_mut().for_each(|v| *v = total);
        }
    }
    out
}

fn same_depth(a: &Tensor, b: &Tensor) -> bool {
    a.depth1() == b.depth1() && a.depth2() == b.depth2()
}

/// Generic matrix product over every `(d1, d2)` pair.
///
/// `lhs(i, k)` and `rhs(k, j)` read the operands, possibly transposed.
fn product<L, R>(
    a: &Tensor,
    b: &Tensor,
    rows: usize,
    cols: usize,
    inner: usize,
    lhs: L,
    rhs: R,
) -> Tensor
where
    L: Fn(&[f32], usize, usize) -> f32,
    R: Fn(&[f32], usize, usize) -> f32,
{
    let mut out = Tensor::new(rows, cols, a.depth1(), a.depth2());
    for d1 in 0..a.depth1() {
        for d2 in 0..a.depth2() {
            let ma = a.matrix(d1, d2);
            let mb = b.matrix(d1, d2);
            let mo = out.matrix_mut(d1, d2);
            for i in 0..rows {
                for j in 0..cols {
                    let mut acc = 0.0f32;
                    for k in 0..inner {
                        acc += lhs(ma, i, k) * rhs(mb, k, j);
                    }
                    mo[i * cols + j] = acc;
                }
            }
        }
    }
    out
}

/// Matrix product `a · b`.
pub fn mul(a: &Tensor, b: &Tensor) -> Result<Tensor> {
    if a.height() != b.width() || !same_depth(a, b) {
        return Err(NetworkError::InconsistentSize("mul"));
    }
    let (ah, bh) = (a.height(), b.height());
    Ok(product(
        a,
        b,
        a.width(),
        bh,
        ah,
        |m, i, k| m[i * ah + k],
        |m, k, j| m[k * bh + j],
    ))
}

/// `a · b + c`, output shaped like `c`.
pub fn muladd(a: &Tensor, b: &Tensor, c: &Tensor) -> Result<Tensor> {
    if a.height() != b.width()
        || a.width() != c.width()
        || b.height() != c.height()
        || !same_depth(a, b)
        || !same_depth(a, c)
    {
        return Err(NetworkError::InconsistentSize("muladd"));
    }
    let mut out = mul(a, b)?;
    out.accumulate(c)?;
    Ok(out)
}

/// `aᵀ · b`, output `(a.height, b.height)`.
pub fn multrans1(a: &Tensor, b: &Tensor) -> Result<Tensor> {
    if a.width() != b.width() || !same_depth(a, b) {
        return Err(NetworkError::InconsistentSize("multrans1"));
    }
    let (ah, bh) = (a.height(), b.height());
    Ok(product(
        a,
        b,
        ah,
        bh,
        a.width(),
        |m, i, k| m[k * ah + i],
        |m, k, j| m[k * bh + j],
    ))
}

/// `a · bᵀ`, output `(a.width, b.width)`.
pub fn multrans2(a: &Tensor, b: &Tensor) -> Result<Tensor> {
    if a.height() != b.height() || !same_depth(a, b) {
        return Err(NetworkError::InconsistentSize("multrans2"));
    }
    let (ah, bh) = (a.height(), b.height());
    Ok(product(
        a,
        b,
        a.width(),
        b.width(),
        ah,
        |m, i, k| m[i * ah + k],
        |m, k, j| m[j * bh + k],
    ))
}

/// Copy of `a` with `pad_x`/`pad_y` zero rows and columns on every side.
pub fn zero_padded(a: &Tensor, pad_x: usize, pad_y: usize) -> Tensor {
    let (w, h) = (a.width(), a.height());
    let (pw, ph) = (w + 2 * pad_x, h + 2 * pad_y);
    let mut out = Tensor::new(pw, ph, a.depth1(), a.depth2());
    for d1 in 0..a.depth1() {
        for d2 in 0..a.depth2() {
            let src = a.matrix(d1, d2);
            let dst = out.matrix_mut(d1, d2);
            for x in 0..w {
                let start = (x + pad_x) * ph + pad_y;
                dst[start..start + h].copy_from_slice(&src[x * h..(x + 1) * h]);
            }
        }
    }
    out
}

/// Accumulate the correlation of `kernel` over `input` into `out`.
///
/// `input` is already padded; `out` is `(ow, oh)`.
#[allow(clippy::too_many_arguments)]
fn correlate_add(
    out: &mut [f32],
    ow: usize,
    oh: usize,
    input: &[f32],
    ih: usize,
    kernel: &[f32],
    kw: usize,
    kh: usize,
) {
    for i in 0..ow {
        for j in 0..oh {
            let mut acc = 0.0f32;
            for a in 0..kw {
                let row = &input[(i + a) * ih + j..(i + a) * ih + j + kh];
                let krow = &kernel[a * kh..(a + 1) * kh];
                acc += row.iter().zip(krow).map(|(x, k)| x * k).sum::<f32>();
            }
            out[i * oh + j] += acc;
        }
    }
}

struct Geometry {
    out_w: usize,
    out_h: usize,
    padded: Tensor,
}

fn geometry(
    input: &Tensor,
    filter: &Tensor,
    stride: usize,
    mode: ConvolutionMode,
    op: &'static str,
) -> Result<Geometry> {
    if stride != 1 {
        return Err(NetworkError::UnsupportedStride(stride));
    }
    let out_w = mode.output_size(input.width(), filter.width());
    let out_h = mode.output_size(input.height(), filter.height());
    match (out_w, out_h) {
        (Some(out_w), Some(out_h)) => {
            let pad_x = mode.padding_for(filter.width());
            let pad_y = mode.padding_for(filter.height());
            let padded = if pad_x == 0 && pad_y == 0 {
                input.clone()
            } else {
                zero_padded(input, pad_x, pad_y)
            };
            Ok(Geometry {
                out_w,
                out_h,
                padded,
            })
        }
        _ => Err(NetworkError::InconsistentSize(op)),
    }
}

fn kernel_matrix(filter: &Tensor, d1: usize, d2: usize, mode: ConvolutionMode) -> Vec<f32> {
    let mut kernel = filter.matrix(d1, d2).to_vec();
    if mode.kernel == KernelMode::Flip {
        kernel.reverse();
    }
    kernel
}

/// Forward convolution: output `depth2 = filter.depth2`, summed over `filter.depth1`.
///
/// Requires `input.depth2 == filter.depth1`.
pub fn convolve_add_forward(
    input: &Tensor,
    filter: &Tensor,
    stride: usize,
    mode: ConvolutionMode,
) -> Result<Tensor> {
    if input.depth2() != filter.depth1() || input.depth1() != 1 {
        return Err(NetworkError::InconsistentSize("convolve_add_forward"));
    }
    let geo = geometry(input, filter, stride, mode, "convolve_add_forward")?;
    let ph = geo.padded.height();
    let mut out = Tensor::new(geo.out_w, geo.out_h, 1, filter.depth2());
    for d2 in 0..filter.depth2() {
        for d1 in 0..filter.depth1() {
            let kernel = kernel_matrix(filter, d1, d2, mode);
            correlate_add(
                out.matrix_mut(0, d2),
                geo.out_w,
                geo.out_h,
                geo.padded.matrix(0, d1),
                ph,
                &kernel,
                filter.width(),
                filter.height(),
            );
        }
    }
    Ok(out)
}

/// Error propagation: output `depth2 = filter.depth1`, summed over `filter.depth2`.
///
/// Requires `input.depth2 == filter.depth2`. The sum is not renormalized by
/// the replication level of the forward accumulation.
pub fn convolve_add_backward(
    input: &Tensor,
    filter: &Tensor,
    stride: usize,
    mode: ConvolutionMode,
) -> Result<Tensor> {
    if input.depth2() != filter.depth2() || input.depth1() != 1 {
        return Err(NetworkError::InconsistentSize("convolve_add_backward"));
    }
    let geo = geometry(input, filter, stride, mode, "convolve_add_backward")?;
    let ph = geo.padded.height();
    let mut out = Tensor::new(geo.out_w, geo.out_h, 1, filter.depth1());
    for d1 in 0..filter.depth1() {
        for d2 in 0..filter.depth2() {
            let kernel = kernel_matrix(filter, d1, d2, mode);
            correlate_add(
                out.matrix_mut(0, d1),
                geo.out_w,
                geo.out_h,
                geo.padded.matrix(0, d2),
                ph,
                &kernel,
                filter.width(),
                filter.height(),
            );
        }
    }
    Ok(out)
}

/// Weight gradient: output `(.., input.depth2, filter.depth2)`.
///
/// `filter` holds one matrix per output map (`depth1 == 1`), typically the
/// error maps of the current layer.
pub fn convolve_update(
    input: &Tensor,
    filter: &Tensor,
    stride: usize,
    mode: ConvolutionMode,
) -> Result<Tensor> {
    if input.depth1() != 1 || filter.depth1() != 1 {
        return Err(NetworkError::InconsistentSize("convolve_update"));
    }
    let geo = geometry(input, filter, stride, mode, "convolve_update")?;
    let ph = geo.padded.height();
    let mut out = Tensor::new(geo.out_w, geo.out_h, input.depth2(), filter.depth2());
    for d1 in 0..input.depth2() {
        for d2 in 0..filter.depth2() {
            let kernel = kernel_matrix(filter, 0, d2, mode);
            correlate_add(
                out.matrix_mut(d1, d2),
                geo.out_w,
                geo.out_h,
                geo.padded.matrix(0, d1),
                ph,
                &kernel,
                filter.width(),
                filter.height(),
            );
        }
    }
    Ok(out)
}

/// Offset of the first maximum inside a pooling window, scanned row-major.
fn window_argmax(matrix: &[f32], height: usize, x0: usize, y0: usize, s: usize) -> usize {
    let mut best = f32::MIN;
    let mut best_offset = x0 * height + y0;
    for r in 0..s {
        for c in 0..s {
            let offset = (x0 + r) * height + y0 + c;
            if matrix[offset] > best {
                best = matrix[offset];
                best_offset = offset;
            }
        }
    }
    best_offset
}

fn check_subsampling(a: &Tensor, factor: usize) -> Result<()> {
    if factor == 0 || a.width() % factor != 0 || a.height() % factor != 0 {
        Err(NetworkError::InvalidSubsampling)
    } else {
        Ok(())
    }
}

/// Max pooling by `factor` along both axes.
pub fn subsample(input: &Tensor, factor: usize) -> Result<Tensor> {
    check_subsampling(input, factor)?;
    let (ow, oh) = (input.width() / factor, input.height() / factor);
    let h = input.height();
    let mut out = Tensor::new(ow, oh, input.depth1(), input.depth2());
    for d1 in 0..input.depth1() {
        for d2 in 0..input.depth2() {
            let src = input.matrix(d1, d2);
            let dst = out.matrix_mut(d1, d2);
            for x in 0..ow {
                for y in 0..oh {
                    dst[x * oh + y] = src[window_argmax(src, h, x * factor, y * factor, factor)];
                }
            }
        }
    }
    Ok(out)
}

/// Route `error` back to the arg-max position of each window of `input_ref`.
pub fn d_subsample(error: &Tensor, input_ref: &Tensor, factor: usize) -> Result<Tensor> {
    check_subsampling(input_ref, factor)?;
    let (ow, oh) = (input_ref.width() / factor, input_ref.height() / factor);
    if error.shape() != (ow, oh, input_ref.depth1(), input_ref.depth2()) {
        return Err(NetworkError::InconsistentSize("d_subsample"));
    }
    let h = input_ref.height();
    let mut out = Tensor::new(
        input_ref.width(),
        input_ref.height(),
        input_ref.depth1(),
        input_ref.depth2(),
    );
    for d1 in 0..input_ref.depth1() {
        for d2 in 0..input_ref.depth2() {
            let reference = input_ref.matrix(d1, d2);
            let err = error.matrix(d1, d2);
            let offsets: Vec<(usize, f32)> = (0..ow)
                .flat_map(|x| (0..oh).map(move |y| (x, y)))
                .map(|(x, y)| {
                    (
                        window_argmax(reference, h, x * factor, y * factor, factor),
                        err[x * oh + y],
                    )
                })
                .collect();
            let dst = out.matrix_mut(d1, d2);
            for (offset, value) in offsets {
                dst[offset] = value;
            }
        }
    }
    Ok(out)
}

/// Flatten all feature maps into a single `(d2*w*h, 1, 1, 1)` vector.
pub fn group(input: &Tensor) -> Result<Tensor> {
    if input.depth1() != 1 {
        return Err(NetworkError::ReplicatedTensor);
    }
    Tensor::from_data(input.size(), 1, 1, 1, input.grouped_data())
}

/// Inverse of [`group`]: reshape `input` to the shape of `reference`.
pub fn ungroup(input: &Tensor, reference: &Tensor) -> Result<Tensor> {
    if reference.depth1() != 1 {
        return Err(NetworkError::ReplicatedTensor);
    }
    if input.size() != reference.size() {
        return Err(NetworkError::InconsistentSize("ungroup"));
    }
    Tensor::from_data(
        reference.width(),
        reference.height(),
        1,
        reference.depth2(),
        input.grouped_data(),
    )
}

/// Fill with Bernoulli(`p`) draws.
pub fn bernoulli(tensor: &mut Tensor, p: f32, rng: &mut NetworkRng) {
    for value in tensor.data_mut() {
        *value = rng.bernoulli(p);
    }
}

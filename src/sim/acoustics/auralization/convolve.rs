use std::sync::Arc;

use rustfft::num_complex::Complex;
use rustfft::{Fft, FftPlanner};

/// Kernels this short are convolved directly.
const DIRECT_LIMIT: usize = 64;

/// Overlap-add convolution with a fixed kernel whose spectrum is computed once.
pub struct FftConvolver {
    kernel_len: usize,
    fft_size: usize,
    kernel_fft: Vec<Complex<f64>>,
    fft: Arc<dyn Fft<f64>>,
    ifft: Arc<dyn Fft<f64>>,
}

impl FftConvolver {
    pub fn new(kernel: &[f64]) -> Self {
        let kernel_len = kernel.len().max(1);
        // Block size: next power of 2 >= 2 * kernel length
        let fft_size = (2 * kernel_len).next_power_of_two();
        let mut planner = FftPlanner::<f64>::new();
        let fft = planner.plan_fft_forward(fft_size);
        let ifft = planner.plan_fft_inverse(fft_size);

        let mut kernel_fft = to_complex(kernel, fft_size);
        fft.process(&mut kernel_fft);
        Self {
            kernel_len,
            fft_size,
            kernel_fft,
            fft,
            ifft,
        }
    }

    /// Full convolution, `signal.len() + kernel.len() - 1` samples.
    pub fn convolve(&self, signal: &[f64]) -> Vec<f64> {
        if signal.is_empty() {
            return Vec::new();
        }
        let output_len = signal.len() + self.kernel_len - 1;
        let block_size = self.fft_size - self.kernel_len + 1;
        let scale = 1.0 / self.fft_size as f64;
        let mut output = vec![0.0; output_len];

        for (block_index, chunk) in signal.chunks(block_size).enumerate() {
            let pos = block_index * block_size;
            let mut block = to_complex(chunk, self.fft_size);
            self.fft.process(&mut block);
            for (b, k) in block.iter_mut().zip(&self.kernel_fft) {
                *b *= k;
            }
            self.ifft.process(&mut block);

            let valid_len = (chunk.len() + self.kernel_len - 1).min(output_len - pos);
            for (out, b) in output[pos..pos + valid_len].iter_mut().zip(&block) {
                *out += b.re * scale;
            }
        }
        output
    }
}

/// Zero-padded complex copy of `x` with `len` samples.
fn to_complex(x: &[f64], len: usize) -> Vec<Complex<f64>> {
    x.iter()
        .map(|&v| Complex::new(v, 0.0))
        .chain(std::iter::repeat(Complex::new(0.0, 0.0)))
        .take(len)
        .collect()
}

/// Full linear convolution of `signal` and `kernel`.
pub fn convolve(signal: &[f64], kernel: &[f64]) -> Vec<f64> {
    if signal.is_empty() || kernel.is_empty() {
        return Vec::new();
    }
    if signal.len() <= DIRECT_LIMIT || kernel.len() <= DIRECT_LIMIT {
        return convolve_direct(signal, kernel);
    }
    FftConvolver::new(kernel).convolve(signal)
}

fn convolve_direct(signal: &[f64], kernel: &[f64]) -> Vec<f64> {
    let mut output = vec![0.0; signal.len() + kernel.len() - 1];
    for (i, &s) in signal.iter().enumerate() {
        for (j, &k) in kernel.iter().enumerate() {
            output[i + j] += s * k;
        }
    }
    output
}

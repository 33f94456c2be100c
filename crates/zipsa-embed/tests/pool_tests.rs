use candle_core::{Device, Tensor, DType};
use zipsa_embed::masked_mean_l2;

#[test]
fn padding_tokens_do_not_contribute() {
    let dev = Device::Cpu;
    // Two tokens with hidden dim 4; the second is padding.
    let h = Tensor::from_slice(&[1.0f32, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0], (1, 2, 4), &dev).expect("hidden");
    let mask = Tensor::from_slice(&[1u32, 0u32], (1, 2), &dev).expect("mask").to_dtype(DType::F32).expect("f32");
    let out = masked_mean_l2(&h, &mask).expect("pool");
    let v: Vec<Vec<f32>> = out.to_vec2().expect("vec");
    let norm: f32 = 30f32.sqrt();
    for (a, b) in v[0].iter().copied().zip([1.0 / norm, 2.0 / norm, 3.0 / norm, 4.0 / norm]) {
        assert!((a - b).abs() < 1e-5, "a={a} b={b}");
    }
}

#[test]
fn batch_rows_are_pooled_independently() {
    let dev = Device::Cpu;
    let h = Tensor::from_slice(&[2.0f32, 0.0, 0.0, 2.0, 0.0, 3.0, 0.0, 3.0], (2, 2, 2), &dev).expect("hidden");
    let mask = Tensor::from_slice(&[1f32, 1.0, 1.0, 0.0], (2, 2), &dev).expect("mask");
    let v: Vec<Vec<f32>> = masked_mean_l2(&h, &mask).expect("pool").to_vec2().expect("vec");
    let half = 0.5f32.sqrt();
    assert!((v[0][0] - half).abs() < 1e-5 && (v[0][1] - half).abs() < 1e-5);
    assert!(v[1][0].abs() < 1e-5 && (v[1][1] - 1.0).abs() < 1e-5);
}

//! DSP Module
//!
//! The bit-crush preview transform and its parameter surface.

mod crush;

pub use crush::{
    effective_hold, quantization_step, quantize_sample, transform, ProcessingParams,
    BYPASS_BIT_DEPTH, MAX_BIT_DEPTH, MAX_HOLD_FACTOR, MIN_BIT_DEPTH, MIN_HOLD_FACTOR,
};

/// Trait for the stages of the per-track signal chain
///
/// All stages operate in place on interleaved stereo f32 samples
/// (L, R, L, R, ...) in the [-1.0, 1.0] range.
///
/// # Real-Time Constraints
/// - No allocations in `process()`
/// - No blocking operations
pub trait AudioEffect: Send {
    /// Process audio buffer in-place
    fn process(&mut self, buffer: &mut [f32], sample_rate: u32);

    /// Reset effect state (e.g., after a seek)
    fn reset(&mut self);

    fn set_enabled(&mut self, enabled: bool);

    fn is_enabled(&self) -> bool;

    /// Effect name (for debugging)
    fn name(&self) -> &str;
}

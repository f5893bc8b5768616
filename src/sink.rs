//! Hardware output capability consumed by the consumer side.

/// Number of hardware playback channels. A stream may use at most this many.
pub const MAX_CHANNELS: u32 = 24;

/// Full-scale volume for one side of a stereo pair.
pub const FULL_SCALE: u16 = 0x3fff;

/// Hardware playback channels addressed by index.
///
/// Implementations are expected to be thin register-write handles: every
/// method must be callable from the completion (interrupt) context, so none
/// of them may block or allocate.
pub trait HardwareSink {
    /// Set a channel's stereo volume pair.
    fn set_channel_volume(&mut self, channel: u32, left: u16, right: u16);

    /// Copy `data` into channel memory at `address` and (re)start or
    /// continue playback from there.
    fn upload_and_continue(&mut self, channel: u32, address: u32, data: &[u8]);

    /// Silence every channel whose bit is set. Muted channels raise no
    /// further completion signals.
    fn mute(&mut self, channel_mask: u32);

    /// Re-arm every channel whose bit is set.
    fn unmute(&mut self, channel_mask: u32);
}

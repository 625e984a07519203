use crate::messages::KeyBits;

/// Translates between an emulator's native controller state and the wire's
/// fixed-schema [`KeyBits`] encoding.
///
/// This layer never interprets button bits itself; it only moves them. The
/// coordination core treats `Self::Buttons` as an opaque type throughout —
/// it stores, delays, and relays values of this type without ever reading
/// a field of it. Only a concrete `ButtonCodec` impl (supplied by the
/// emulator plugin integration) knows what the bits mean.
///
/// Encode/decode are fallible because the original protocol models them
/// that way: a plugin-supplied encoder can reject a controller state it
/// can't represent on the wire, and a decoder can reject a `KeyBits` it
/// can't make sense of (see `FAILED_TO_ENCODE` / `INVALID_BUTTONS_MESSAGE`
/// on the stream handler).
pub trait ButtonCodec {
    type Buttons: Copy + Default;

    fn encode(buttons: Self::Buttons) -> Option<KeyBits>;
    fn decode(bits: KeyBits) -> Option<Self::Buttons>;
}

/// A codec for callers that already speak the wire's `KeyBits` layout
/// directly and want it passed through unchanged. Used by the workspace's
/// own tests, and as the default for integrations that haven't written a
/// plugin-specific codec yet.
#[derive(Debug, Clone, Copy, Default)]
pub struct OpaqueButtonCodec;

impl ButtonCodec for OpaqueButtonCodec {
    type Buttons = KeyBits;

    fn encode(buttons: KeyBits) -> Option<KeyBits> {
        Some(buttons)
    }

    fn decode(bits: KeyBits) -> Option<KeyBits> {
        Some(bits)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opaque_codec_is_identity() {
        let bits = KeyBits {
            buttons: 0xBEEF,
            x_axis: -12,
            y_axis: 34,
            reserved_1: 0,
            reserved_2: 0,
        };
        assert_eq!(OpaqueButtonCodec::encode(bits), Some(bits));
        assert_eq!(OpaqueButtonCodec::decode(bits), Some(bits));
    }
}

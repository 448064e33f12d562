/// Byte accessors, hex rendering and a short `Debug` for a tuple struct
/// over `[u8; N]`.
macro_rules! fixed_bytes {
    ($name:ident, $len:expr, $label:literal) => {
        impl $name {
            pub const fn from_bytes(bytes: [u8; $len]) -> Self {
                Self(bytes)
            }

            pub const fn as_bytes(&self) -> &[u8; $len] {
                &self.0
            }

            pub fn to_hex(&self) -> String {
                hex::encode(self.0)
            }
        }

        impl std::fmt::Debug for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                let hex = self.to_hex();
                write!(f, concat!($label, "({})"), &hex[..hex.len().min(16)])
            }
        }
    };
}

mod key_material;

pub use key_material::{derive_key_material, EncryptionScheme, KeyMaterial, KeyMaterialError};

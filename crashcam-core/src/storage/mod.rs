pub mod checksum;
pub mod directory;
pub mod hybrid_encryptor;
pub mod metadata;

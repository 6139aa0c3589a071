// coursesmith-common: pure helpers shared by the coursesmith engine and CLI

pub mod encoding;
pub mod hash;
pub mod names;
pub mod path;

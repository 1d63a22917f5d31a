pub mod awlwwmap;
pub mod causal;
pub mod lattice;
pub mod orset;

/// The largest sample program; every bench runs over it.
pub static INPUT: &str = include_str!("../../samples/big.c");

pub mod benchmark;
pub mod fib;
pub mod interest;
pub mod publish;
pub mod xdp;

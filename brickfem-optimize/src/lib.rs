/// Vector function traits and numerical differentiation
pub mod calculus;
/// Newton's method with pluggable line search
pub mod newton;

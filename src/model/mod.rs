//! Neural network architecture
//!
//! A small 1-D convolutional network that reads the scaled feature row as a
//! single-channel sequence.

pub mod conv_net;

pub use conv_net::FraudConvNet;

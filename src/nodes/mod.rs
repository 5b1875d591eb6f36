//! Audio node implementations for the render graph
//!
//! This module contains concrete implementations of the AudioNode trait.
//!
//! # Node Categories
//!
//! ## Source Nodes (start/stop lifecycle)
//! - [`oscillator::OscillatorNode`] - Sine voice with automatable frequency
//!
//! ## Processing Nodes
//! - [`gain::GainNode`] - Apply automatable gain to the summed input
//! - [`biquad_filter::BiquadFilterNode`] - Lowpass/highpass biquad
//! - [`convolution::ConvolutionNode`] - Partitioned FFT convolution reverb
//!
//! ## Output
//! - [`destination::DestinationNode`] - Final mix bus
//!
//! Automation parameters are modelled by [`param::AudioParam`].
pub mod biquad_filter;
pub mod convolution;
pub mod destination;
pub mod gain;
pub mod oscillator;
pub mod param;

pub use biquad_filter::{BiquadFilterNode, FilterKind};
pub use convolution::ConvolutionNode;
pub use destination::DestinationNode;
pub use gain::GainNode;
pub use oscillator::OscillatorNode;
pub use param::AudioParam;

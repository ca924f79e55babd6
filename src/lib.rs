//! Threaded element and node loops for finite element assembly.
//!
//! The crate walks ranges of mesh entities on a pool of worker threads, evaluates the
//! registered callback objects at every quadrature point or node, and scatters the local
//! contributions into shared global vectors and matrices. Partial results of sibling
//! sub-ranges are merged with associative and commutative joins, so the outcome does not
//! depend on how the range was partitioned (up to floating-point reassociation).
use nalgebra::RealField;

pub mod compute;
pub mod config;
pub mod dispatch;
pub mod dof;
pub mod engine;
pub mod error;
pub mod fe;
pub mod kernels;
pub mod mesh;
pub mod objects;
pub mod problem;
pub mod reduction;
pub mod registry;
pub mod scatter;

pub extern crate meshloop_range;
pub extern crate nalgebra;
pub extern crate nalgebra_sparse;

pub use meshloop_range::StoredRange;

/// Real scalar type used throughout the crate.
pub trait Real: RealField + Copy {}

impl<T: RealField + Copy> Real for T {}

/// Integer tag of a mesh subdomain (block).
pub type SubdomainId = u32;

/// Integer tag of a side set or node set.
pub type BoundaryId = u32;

use crate::engine::ThreadedElementLoop;
use crate::fe::FeReinit;
use crate::mesh::ElementHandle;
use crate::reduction::{Max, Reduce, SetUnion};
use crate::{Real, SubdomainId};
use std::collections::BTreeSet;

/// Determines the largest quadrature rule and element in use, for sizing storage that is
/// indexed by quadrature point or shape function.
pub struct MaxQpsLoop<'a, T: Real> {
    fe: &'a dyn FeReinit<T>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MaxQpsContext {
    pub max_qps: Max<usize>,
    pub max_shape_functions: Max<usize>,
    pub subdomains: SetUnion<SubdomainId>,
}

impl Reduce for MaxQpsContext {
    fn join(&mut self, other: Self) {
        self.max_qps.join(other.max_qps);
        self.max_shape_functions.join(other.max_shape_functions);
        self.subdomains.join(other.subdomains);
    }
}

/// Joined result of a [`MaxQpsLoop`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MaxQpsReport {
    /// Largest number of quadrature points on any element or side.
    pub max_qps: usize,
    pub max_shape_functions: usize,
    pub subdomains: BTreeSet<SubdomainId>,
}

impl From<MaxQpsContext> for MaxQpsReport {
    fn from(ctx: MaxQpsContext) -> Self {
        Self {
            max_qps: ctx.max_qps.get().unwrap_or(0),
            max_shape_functions: ctx.max_shape_functions.get().unwrap_or(0),
            subdomains: ctx.subdomains.into_inner(),
        }
    }
}

impl<'a, T: Real> MaxQpsLoop<'a, T> {
    pub fn new(fe: &'a dyn FeReinit<T>) -> Self {
        Self { fe }
    }
}

impl<'a, T: Real> ThreadedElementLoop for MaxQpsLoop<'a, T> {
    type Context = MaxQpsContext;

    fn create_context(&self) -> Self::Context {
        MaxQpsContext::default()
    }

    fn on_element(&self, ctx: &mut Self::Context, element: ElementHandle) -> eyre::Result<()> {
        ctx.max_qps.update(self.fe.element_qp_count(element.id));
        for side in 0..self.fe.element_side_count(element.id) {
            ctx.max_qps.update(self.fe.side_qp_count(element.id, side));
        }
        ctx.max_shape_functions
            .update(self.fe.element_shape_count(element.id));
        ctx.subdomains.insert(element.subdomain);
        Ok(())
    }

    fn join(&self, ctx: &mut Self::Context, other: Self::Context) {
        ctx.join(other);
    }
}

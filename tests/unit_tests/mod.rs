mod dispatch;
mod dof;
mod fe;
mod reduction;
mod registry;

pub mod goal;
pub mod step;

pub mod allocation;
pub mod department;
pub mod designation;
pub mod status;

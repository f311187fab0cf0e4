pub mod doctor;
pub mod embed;

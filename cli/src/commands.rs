pub mod combine;
pub mod run;
pub mod vectorize;

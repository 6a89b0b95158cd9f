pub mod ecg;
pub mod pan_tompkins;

pub mod driver;
pub mod hid_report;

#[cfg(test)]
mod hid_report_test;

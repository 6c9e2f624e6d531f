pub mod report_export;

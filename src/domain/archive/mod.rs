pub mod demo_archive;

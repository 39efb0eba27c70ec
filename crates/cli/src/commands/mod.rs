pub mod ask;
pub mod bootstrap;
pub mod doctor;
pub mod init;
pub mod serve;

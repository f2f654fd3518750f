pub mod system_tray;

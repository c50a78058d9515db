pub mod request_watcher;

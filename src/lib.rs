pub mod db;
pub mod logs;
pub mod models;
pub mod monitor;
pub mod occupancy;
pub mod settings;
pub mod store;
mod utils;

#[cfg(feature = "desktop")]
pub use desktop::run;

#[cfg(feature = "desktop")]
mod desktop {
    use tauri::{Manager, State};

    use crate::{
        db::Database,
        logs::commands::{list_attendance_logs, record_scan},
        monitor::{
            commands::{
                email_instructor, get_room_board, get_room_detail, list_room_requests,
                request_room, set_room_binding,
            },
            RoomMonitor,
        },
        settings::{BuildingConfig, SettingsStore},
    };

    pub(crate) struct AppState {
        pub(crate) db: Database,
        pub(crate) monitor: RoomMonitor,
        pub(crate) settings: SettingsStore,
    }

    #[tauri::command]
    fn get_building(state: State<AppState>) -> Result<BuildingConfig, String> {
        Ok(state.settings.building())
    }

    #[cfg_attr(mobile, tauri::mobile_entry_point)]
    pub fn run() {
        // Initialize logging (reads RUST_LOG env var)
        env_logger::Builder::from_default_env()
            .filter_level(log::LevelFilter::Info)
            .init();

        log::info!("roomwatch starting up...");

        tauri::Builder::default()
            .plugin(tauri_plugin_opener::init())
            .setup(|app| {
                let result = (|| -> anyhow::Result<()> {
                    let app_data_dir = app
                        .path()
                        .app_data_dir()
                        .map_err(|err| anyhow::anyhow!(err))?;
                    std::fs::create_dir_all(&app_data_dir)?;

                    let db_path = app_data_dir.join("roomwatch.sqlite3");
                    let database = Database::new(db_path)?;
                    log::info!("Database ready at {}", database.path().display());

                    let settings_path = SettingsStore::resolve_path(&app_data_dir);
                    let settings_store = SettingsStore::new(settings_path)?;
                    log::info!(
                        "Using building config at {}",
                        settings_store.path().display()
                    );

                    let monitor = {
                        let store = database.clone();
                        let config = settings_store.building();
                        let handle = app.handle().clone();
                        tauri::async_runtime::block_on(async move {
                            RoomMonitor::start(store, config, handle).await
                        })?
                    };

                    app.manage(AppState {
                        db: database,
                        monitor,
                        settings: settings_store,
                    });

                    Ok(())
                })();

                result.map_err(|err| err.into())
            })
            .invoke_handler(tauri::generate_handler![
                get_building,
                get_room_board,
                get_room_detail,
                list_attendance_logs,
                record_scan,
                request_room,
                list_room_requests,
                set_room_binding,
                email_instructor,
            ])
            .run(tauri::generate_context!())
            .expect("error while running tauri application");
    }
}

#[cfg(feature = "desktop")]
pub(crate) use desktop::AppState;

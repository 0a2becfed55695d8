//! Static partition of RPC method names into authorization tiers.
//!
//! Classification is a pure, total lookup: methods in neither set fall
//! through to the default tier, so it never fails — it only decides
//! which credential is attached and which URL path the call takes.

use crate::auth::AuthTier;

/// Methods reachable with a dashboard credential.
pub const DASHBOARD_METHODS: &[&str] = &[
    // Configurator management
    "WFC_GetConfigurators",
    "WFC_GetSnapshot",
    "WFC_Execute",
    "WFC_RegisterPNS",
    // Backend helper surface
    "KNO_GetAppInfo",
    "KNO_GetConfigurations",
    "KNO_GetConfiguration",
    "KNO_SetConfiguration",
    "KNO_GetIcons",
    "KNO_GetIconUrl",
    "KNO_GetSnapshotObject",
    "KNO_RunScene",
    "KNO_UpdateApp",
    "KNO_GetLoggedValues",
    "KNO_InitSystemFolders",
    // Module registry queries
    "IPS_GetLibraryList",
    "IPS_GetModule",
    "IPS_GetLibrary",
    "IPS_GetLibraryModules",
    "IPS_GetModuleList",
    "IPS_GetInstanceListByModuleID",
    "IPS_GetActionsByEnvironment",
    "IPS_GetTranslatedActionsByEnvironment",
    // Push-notification device control
    "NC_AddDevice",
    "NC_GetDevices",
    "NC_RemoveDevice",
    "NC_SetDeviceName",
];

/// Methods reachable only with an advanced-settings credential.
pub const ADVANCED_SETTINGS_METHODS: &[&str] = &[
    "KNO_GetSceneConfig",
    "KNO_SyncScene",
    "KNO_DeleteScene",
    "KNO_GetAlarms",
    "KNO_SyncAlarm",
    "KNO_DeleteAlarm",
    "KNO_SyncEvent",
    "KNO_DeleteEvent",
    "KNO_SyncFooterVars",
    "KNO_ChangePassword",
    "KNO_GetFlowScriptData",
    "KNO_SyncFlowScript",
    "KNO_DeleteFlowScript",
];

/// Classify a method name into its authorization tier.
pub fn classify(method: &str) -> AuthTier {
    if ADVANCED_SETTINGS_METHODS.contains(&method) {
        AuthTier::AdvancedSettings
    } else if DASHBOARD_METHODS.contains(&method) {
        AuthTier::Dashboard
    } else {
        AuthTier::Default
    }
}

/// Configurator-management methods stay on the base `/api/` path even
/// though they classify into the dashboard tier.
pub fn uses_base_path(method: &str) -> bool {
    method.starts_with("WFC_")
}

use crate::domain::accounter::accounter::ResourceAccounter;
use crate::domain::resource::assignment::AssignmentMap;
use crate::domain::utils::id::AppUid;
use crate::error::Result;

/// The platform enforcement contract.
///
/// The core never touches the hardware directly: registering the resource
/// hierarchy, preparing per-application enforcement state and applying an
/// assignment map all go through this interface. Implementations are
/// platform specific (control groups, accelerator drivers, or the
/// simulated platform used by the test suites).
pub trait PlatformProxy: Send + Sync {
    /// A short identifier for logs.
    fn name(&self) -> &'static str;

    /// Registers the platform resources into the accounter's inventory.
    fn load_platform_data(&self, accounter: &ResourceAccounter) -> Result<()>;

    /// Prepares per-application enforcement state (e.g. a cgroup).
    fn setup(&self, app: AppUid) -> Result<()>;

    /// Applies the assignment at the hardware level. With `exclusive`
    /// set, the assigned processing elements are not shared.
    fn map_resources(&self, app: AppUid, map: &AssignmentMap, exclusive: bool) -> Result<()>;

    /// Reverts the current mapping of the application.
    fn reclaim_resources(&self, app: AppUid) -> Result<()>;

    /// Disposes of the per-application enforcement state.
    fn release(&self, app: AppUid) -> Result<()>;

    /// Re-reads the platform availabilities after a change notification
    /// and updates the registered resources accordingly.
    fn refresh(&self, accounter: &ResourceAccounter) -> Result<()>;
}

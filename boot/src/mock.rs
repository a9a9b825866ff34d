// In-memory firmware for host tests
//
// Volumes, files and boot service failures are scripted up front with the
// `with_*` builders and `fail_*` switches. Counters record what is still open
// or allocated so tests can check that every early return cleans up.

use std::alloc::{self, Layout};
use std::boxed::Box;
use std::cell::{Cell, RefCell};
use std::format;
use std::ptr::NonNull;
use std::rc::Rc;
use std::string::{String, ToString};
use std::sync::Once;
use std::vec::Vec;

use log::{Level, LevelFilter, Log, Metadata, Record};

use shared::MemoryRangeDescriptor;
use uefi::Status;

use crate::error::{BootError, HintError};
use crate::firmware::{FileReader, Firmware, PoolAllocator, Volume};
use crate::policy::{decode_hint, BootHint};
use crate::ramdisk::MediaProvider;

const POOL_ALIGN: usize = 8;

/// Scripted misbehaviour of a single file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileFault {
    /// File reports its full size but runs out of data half way.
    ShortRead,
    Read(Status),
    Size(Status),
}

#[derive(Debug, Clone)]
struct MockFileSpec {
    path: String,
    data: Rc<[u8]>,
    fault: Option<FileFault>,
}

#[derive(Debug, Clone, Default)]
struct VolumeSpec {
    files: Vec<MockFileSpec>,
    open_error: Option<Status>,
}

/// What the firmware saw of the kernel image
#[derive(Debug, Clone)]
pub struct LoadedKernel {
    pub descriptor: MemoryRangeDescriptor,
    pub bytes: Vec<u8>,
    pub command_line: Option<String>,
}

#[derive(Default)]
struct State {
    open_roots: Cell<usize>,
    open_files: Cell<usize>,
    probed: RefCell<Vec<usize>>,
    opened: RefCell<Vec<String>>,
    allocations: RefCell<Vec<(usize, usize)>>,
    unloaded: Cell<usize>,
}

impl Drop for State {
    fn drop(&mut self) {
        // Buffers handed to the "kernel" are never freed by the loader.
        for (ptr, size) in self.allocations.get_mut().drain(..) {
            if let Ok(layout) = Layout::from_size_align(size, POOL_ALIGN) {
                unsafe { alloc::dealloc(ptr as *mut u8, layout) };
            }
        }
    }
}

pub struct MockFirmware {
    state: Rc<State>,
    volumes: Vec<VolumeSpec>,
    hint: Option<String>,

    alloc_failure: Cell<Option<Status>>,
    enumeration_failure: Cell<Option<Status>>,
    install_failure: Cell<Option<Status>>,
    load_failure: Cell<Option<Status>>,
    load_options_failure: Cell<Option<Status>>,
    start_status: Cell<Status>,

    installed: Cell<Option<*const (dyn MediaProvider + 'static)>>,
    registrations: Cell<usize>,
    ramdisk_seen: RefCell<Option<Vec<u8>>>,
    loaded: RefCell<Option<LoadedKernel>>,
}

impl MockFirmware {
    pub fn new() -> Self {
        Self {
            state: Rc::new(State::default()),
            volumes: Vec::new(),
            hint: None,
            alloc_failure: Cell::new(None),
            enumeration_failure: Cell::new(None),
            install_failure: Cell::new(None),
            load_failure: Cell::new(None),
            load_options_failure: Cell::new(None),
            start_status: Cell::new(Status::ABORTED),
            installed: Cell::new(None),
            registrations: Cell::new(0),
            ramdisk_seen: RefCell::new(None),
            loaded: RefCell::new(None),
        }
    }

    /// Add a volume holding `files`.
    pub fn with_volume<B: AsRef<[u8]>>(mut self, files: &[(&str, B)]) -> Self {
        let mut volume = VolumeSpec::default();
        for (path, data) in files {
            volume.files.push(MockFileSpec {
                path: path.to_string(),
                data: Rc::from(data.as_ref()),
                fault: None,
            });
        }
        self.volumes.push(volume);
        self
    }

    pub fn with_empty_volume(mut self) -> Self {
        self.volumes.push(VolumeSpec::default());
        self
    }

    /// Add a volume whose root cannot be opened.
    pub fn with_unopenable_volume(mut self, status: Status) -> Self {
        self.volumes.push(VolumeSpec {
            open_error: Some(status),
            ..VolumeSpec::default()
        });
        self
    }

    /// Add a file to the most recently added volume.
    pub fn with_file(mut self, path: &str, data: &[u8]) -> Self {
        if self.volumes.is_empty() {
            self.volumes.push(VolumeSpec::default());
        }
        if let Some(volume) = self.volumes.last_mut() {
            volume.files.push(MockFileSpec {
                path: path.to_string(),
                data: Rc::from(data),
                fault: None,
            });
        }
        self
    }

    /// Make `path` on the most recently added volume misbehave.
    pub fn with_file_fault(mut self, path: &str, fault: FileFault) -> Self {
        if let Some(volume) = self.volumes.last_mut() {
            for file in volume.files.iter_mut().filter(|f| f.path == path) {
                file.fault = Some(fault);
            }
        }
        self
    }

    pub fn with_hint(mut self, hint: &str) -> Self {
        self.hint = Some(hint.to_string());
        self
    }

    pub fn fail_allocations(&self, status: Status) {
        self.alloc_failure.set(Some(status));
    }

    pub fn fail_handle_enumeration(&self, status: Status) {
        self.enumeration_failure.set(Some(status));
    }

    pub fn fail_install(&self, status: Status) {
        self.install_failure.set(Some(status));
    }

    pub fn fail_load_image(&self, status: Status) {
        self.load_failure.set(Some(status));
    }

    pub fn fail_load_options(&self, status: Status) {
        self.load_options_failure.set(Some(status));
    }

    /// Status the "kernel" returns from StartImage.
    pub fn set_start_status(&self, status: Status) {
        self.start_status.set(status);
    }

    pub fn live_allocations(&self) -> usize {
        self.state.allocations.borrow().len()
    }

    pub fn open_roots(&self) -> usize {
        self.state.open_roots.get()
    }

    pub fn open_files(&self) -> usize {
        self.state.open_files.get()
    }

    /// Volumes a file open was attempted on, in first-probe order
    pub fn probed_volumes(&self) -> Vec<usize> {
        self.state.probed.borrow().clone()
    }

    /// Every path that was successfully opened, in order
    pub fn files_opened(&self) -> Vec<String> {
        self.state.opened.borrow().clone()
    }

    /// Ramdisk providers currently installed
    pub fn registrations(&self) -> usize {
        self.registrations.get()
    }

    pub fn unloaded_images(&self) -> usize {
        self.state.unloaded.get()
    }

    pub fn loaded_kernel(&self) -> Option<LoadedKernel> {
        self.loaded.borrow().clone()
    }

    /// Ramdisk bytes the kernel fetched while starting, if any
    pub fn ramdisk_seen_by_kernel(&self) -> Option<Vec<u8>> {
        self.ramdisk_seen.borrow().clone()
    }

    /// What a Linux EFI stub does: size query, then fetch.
    fn fetch_ramdisk(&self) {
        let Some(provider) = self.installed.get() else {
            return;
        };
        // Safety: the pointer is cleared when the registration guard drops,
        // and the guard outlives StartImage.
        let provider = unsafe { &*provider };

        let required = match provider.provide(None) {
            Err(BootError::BufferTooSmall { required }) => required,
            _ => return,
        };
        let mut buffer = std::vec![0u8; required];
        if let Ok(copied) = provider.provide(Some(&mut buffer[..])) {
            buffer.truncate(copied);
            *self.ramdisk_seen.borrow_mut() = Some(buffer);
        }
    }
}

impl Default for MockFirmware {
    fn default() -> Self {
        Self::new()
    }
}

impl PoolAllocator for MockFirmware {
    fn allocate(&self, size: usize) -> Result<NonNull<u8>, Status> {
        if let Some(status) = self.alloc_failure.get() {
            return Err(status);
        }
        let layout =
            Layout::from_size_align(size, POOL_ALIGN).map_err(|_| Status::BAD_BUFFER_SIZE)?;
        let ptr = NonNull::new(unsafe { alloc::alloc(layout) }).ok_or(Status::OUT_OF_RESOURCES)?;
        self.state
            .allocations
            .borrow_mut()
            .push((ptr.as_ptr() as usize, size));
        Ok(ptr)
    }

    unsafe fn free(&self, ptr: NonNull<u8>, size: usize) {
        let mut allocations = self.state.allocations.borrow_mut();
        let index = allocations
            .iter()
            .position(|&(p, s)| p == ptr.as_ptr() as usize && s == size)
            .expect("free of unknown allocation");
        allocations.swap_remove(index);
        let layout = Layout::from_size_align(size, POOL_ALIGN).expect("valid layout");
        alloc::dealloc(ptr.as_ptr(), layout);
    }
}

pub struct MockVolume {
    index: usize,
    spec: VolumeSpec,
    state: Rc<State>,
}

impl Volume for MockVolume {
    type File = MockFile;

    fn open_read(&mut self, path: &str) -> Result<MockFile, Status> {
        {
            let mut probed = self.state.probed.borrow_mut();
            if !probed.contains(&self.index) {
                probed.push(self.index);
            }
        }

        let file = self
            .spec
            .files
            .iter()
            .find(|f| f.path == path)
            .ok_or(Status::NOT_FOUND)?;

        self.state.open_files.set(self.state.open_files.get() + 1);
        self.state.opened.borrow_mut().push(path.to_string());
        Ok(MockFile {
            data: file.data.clone(),
            position: 0,
            fault: file.fault,
            state: self.state.clone(),
        })
    }
}

impl Drop for MockVolume {
    fn drop(&mut self) {
        self.state.open_roots.set(self.state.open_roots.get() - 1);
    }
}

pub struct MockFile {
    data: Rc<[u8]>,
    position: usize,
    fault: Option<FileFault>,
    state: Rc<State>,
}

impl FileReader for MockFile {
    fn size(&mut self) -> Result<u64, Status> {
        match self.fault {
            Some(FileFault::Size(status)) => Err(status),
            _ => Ok(self.data.len() as u64),
        }
    }

    fn read(&mut self, buffer: &mut [u8]) -> Result<usize, Status> {
        let available = match self.fault {
            Some(FileFault::Read(status)) => return Err(status),
            Some(FileFault::ShortRead) => self.data.len() / 2,
            _ => self.data.len(),
        };
        let count = buffer.len().min(available.saturating_sub(self.position));
        buffer[..count].copy_from_slice(&self.data[self.position..self.position + count]);
        self.position += count;
        Ok(count)
    }
}

impl Drop for MockFile {
    fn drop(&mut self) {
        self.state.open_files.set(self.state.open_files.get() - 1);
    }
}

pub struct MockRegistration<'a> {
    fw: &'a MockFirmware,
}

impl Drop for MockRegistration<'_> {
    fn drop(&mut self) {
        self.fw.installed.set(None);
        self.fw.registrations.set(self.fw.registrations.get() - 1);
    }
}

pub struct MockImage {
    state: Rc<State>,
    started: bool,
}

impl Drop for MockImage {
    fn drop(&mut self) {
        if !self.started {
            self.state.unloaded.set(self.state.unloaded.get() + 1);
        }
    }
}

impl Firmware for MockFirmware {
    type Handle = usize;
    type Volume = MockVolume;
    type Registration<'a> = MockRegistration<'a> where Self: 'a;
    type Image = MockImage;

    fn boot_hint(&self) -> Result<Option<BootHint>, HintError> {
        let Some(hint) = &self.hint else {
            return Ok(None);
        };
        let raw: Vec<u8> = hint
            .encode_utf16()
            .chain(core::iter::once(0))
            .flat_map(u16::to_le_bytes)
            .collect();
        decode_hint(&raw)
    }

    fn filesystem_handles(&self) -> Result<Vec<usize>, Status> {
        match self.enumeration_failure.get() {
            Some(status) => Err(status),
            None => Ok((0..self.volumes.len()).collect()),
        }
    }

    fn describe(&self, handle: usize) -> Option<String> {
        Some(format!("VenHw(mock)/HD({},GPT)", handle + 1))
    }

    fn open_volume(&self, handle: usize) -> Result<MockVolume, Status> {
        let spec = self.volumes.get(handle).ok_or(Status::INVALID_PARAMETER)?;
        if let Some(status) = spec.open_error {
            return Err(status);
        }
        self.state.open_roots.set(self.state.open_roots.get() + 1);
        Ok(MockVolume {
            index: handle,
            spec: spec.clone(),
            state: self.state.clone(),
        })
    }

    fn install_ramdisk<'a>(
        &'a self,
        provider: &'a dyn MediaProvider,
    ) -> Result<MockRegistration<'a>, Status> {
        if let Some(status) = self.install_failure.get() {
            return Err(status);
        }
        // Safety: only the lifetime is erased; `MockRegistration` clears the
        // pointer before `'a` ends.
        let erased = unsafe {
            core::mem::transmute::<
                *const (dyn MediaProvider + 'a),
                *const (dyn MediaProvider + 'static),
            >(provider as *const (dyn MediaProvider + 'a))
        };
        self.installed.set(Some(erased));
        self.registrations.set(self.registrations.get() + 1);
        Ok(MockRegistration { fw: self })
    }

    fn load_image(
        &self,
        descriptor: &MemoryRangeDescriptor,
        image: &[u8],
    ) -> Result<MockImage, Status> {
        if let Some(status) = self.load_failure.get() {
            return Err(status);
        }
        *self.loaded.borrow_mut() = Some(LoadedKernel {
            descriptor: descriptor.clone(),
            bytes: image.to_vec(),
            command_line: None,
        });
        Ok(MockImage {
            state: self.state.clone(),
            started: false,
        })
    }

    fn set_load_options(&self, _image: &mut MockImage, command_line: &str) -> Result<(), Status> {
        if let Some(status) = self.load_options_failure.get() {
            return Err(status);
        }
        if let Some(kernel) = self.loaded.borrow_mut().as_mut() {
            kernel.command_line = Some(command_line.to_string());
        }
        Ok(())
    }

    fn start_image(&self, mut image: MockImage) -> Status {
        image.started = true;
        self.fetch_ramdisk();
        self.start_status.get()
    }
}

thread_local! {
    static CAPTURED: RefCell<Vec<(Level, String)>> = const { RefCell::new(Vec::new()) };
}

static LOGGER_INIT: Once = Once::new();

/// Records every log line emitted on the calling thread, then hands it to
/// env_logger so `RUST_LOG` still controls what is printed.
struct CaptureLogger {
    inner: env_logger::Logger,
}

impl Log for CaptureLogger {
    fn enabled(&self, _metadata: &Metadata) -> bool {
        true
    }

    fn log(&self, record: &Record) {
        CAPTURED.with(|captured| {
            captured
                .borrow_mut()
                .push((record.level(), format!("{}", record.args())))
        });
        self.inner.log(record);
    }

    fn flush(&self) {
        self.inner.flush();
    }
}

/// Install the capturing logger (once per test binary) and clear this
/// thread's captured records.
pub fn capture_logs() {
    LOGGER_INIT.call_once(|| {
        let inner = env_logger::Builder::from_default_env().is_test(true).build();
        let logger: &'static CaptureLogger = Box::leak(Box::new(CaptureLogger { inner }));
        if log::set_logger(logger).is_ok() {
            log::set_max_level(LevelFilter::Trace);
        }
    });
    CAPTURED.with(|captured| captured.borrow_mut().clear());
}

/// Records captured on this thread since the last [`capture_logs`].
pub fn captured_logs() -> Vec<(Level, String)> {
    CAPTURED.with(|captured| captured.borrow().clone())
}

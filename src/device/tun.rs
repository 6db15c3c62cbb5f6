//! TUN device implementation

use super::Device;
use crate::{Error, Result};
use std::fs::{File, OpenOptions};
use std::io::{self, Read, Write};
use std::os::unix::fs::OpenOptionsExt;
use std::os::unix::io::{AsRawFd, RawFd};
use tokio::io::unix::AsyncFd;
use tracing::{debug, trace};

const TUN_CLONE_DEVICE: &str = "/dev/net/tun";

/// TUN interface opened without packet information headers
pub struct TunDevice {
    async_fd: AsyncFd<File>,
    name: String,
}

impl TunDevice {
    /// Create (or attach to) the TUN interface `name`.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn create(name: &str) -> Result<Self> {
        if name.is_empty() || name.len() >= libc::IFNAMSIZ {
            return Err(Error::Config(format!(
                "invalid interface name {:?}: must be 1-{} bytes",
                name,
                libc::IFNAMSIZ - 1
            )));
        }

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .custom_flags(libc::O_NONBLOCK | libc::O_CLOEXEC)
            .open(TUN_CLONE_DEVICE)?;

        let mut ifr: libc::ifreq = unsafe { std::mem::zeroed() };
        for (dst, src) in ifr.ifr_name.iter_mut().zip(name.as_bytes()) {
            *dst = *src as libc::c_char;
        }
        ifr.ifr_ifru.ifru_flags = (libc::IFF_TUN | libc::IFF_NO_PI) as libc::c_short;

        let ret = unsafe { libc::ioctl(file.as_raw_fd(), libc::TUNSETIFF, &mut ifr) };
        if ret < 0 {
            return Err(Error::Io(io::Error::last_os_error()));
        }

        // The kernel writes back the final name (relevant for patterns like "tun%d")
        let name = ifr
            .ifr_name
            .iter()
            .take_while(|&&c| c != 0)
            .map(|&c| c as u8 as char)
            .collect::<String>();

        let async_fd = register(file)?;
        debug!(interface = %name, "TUN device opened");

        Ok(Self { async_fd, name })
    }
}

/// Hand a non-blocking descriptor to the Tokio reactor.
fn register(file: File) -> Result<AsyncFd<File>> {
    // SAFETY: the AsyncFd takes ownership of `file`, so the descriptor stays
    // open and unchanged until the AsyncFd is dropped.
    unsafe { AsyncFd::register(file) }.map_err(|e| Error::Io(e.into()))
}

impl AsRawFd for TunDevice {
    fn as_raw_fd(&self) -> RawFd {
        self.async_fd.get_ref().as_raw_fd()
    }
}

impl Device for TunDevice {
    fn name(&self) -> &str {
        &self.name
    }

    async fn read_batch<B>(
        &self,
        bufs: &mut [B],
        sizes: &mut [usize],
        offset: usize,
    ) -> Result<usize>
    where
        B: AsMut<[u8]> + Send,
    {
        let max = bufs.len().min(sizes.len());

        loop {
            let mut guard = self.async_fd.readable().await?;
            let mut count = 0;

            while count < max {
                let buf = &mut bufs[count].as_mut()[offset..];
                match guard.try_io(|inner| inner.get_ref().read(buf)) {
                    Ok(Ok(0)) => {
                        if count > 0 {
                            break;
                        }
                        return Err(Error::DeviceClosed {
                            name: self.name.clone(),
                        });
                    }
                    Ok(Ok(n)) => {
                        sizes[count] = n;
                        count += 1;
                    }
                    // Hand over what we already have, the error will resurface on the next call
                    Ok(Err(e)) => {
                        if count > 0 {
                            break;
                        }
                        return Err(Error::Io(e));
                    }
                    Err(_would_block) => break,
                }
            }

            if count > 0 {
                trace!(interface = %self.name, packets = count, "read batch");
                return Ok(count);
            }
        }
    }

    async fn write_batch<B>(&self, bufs: &[B], offset: usize) -> Result<usize>
    where
        B: AsRef<[u8]> + Sync,
    {
        for (written, buf) in bufs.iter().enumerate() {
            let payload = &buf.as_ref()[offset..];

            loop {
                let mut guard = self.async_fd.writable().await.map_err(|source| {
                    Error::PartialWrite {
                        written,
                        total: bufs.len(),
                        source,
                    }
                })?;

                match guard.try_io(|inner| inner.get_ref().write(payload)) {
                    Ok(Ok(_)) => break,
                    Ok(Err(source)) => {
                        return Err(Error::PartialWrite {
                            written,
                            total: bufs.len(),
                            source,
                        });
                    }
                    Err(_would_block) => continue,
                }
            }
        }

        trace!(interface = %self.name, packets = bufs.len(), "wrote batch");
        Ok(bufs.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_rejects_overlong_name() {
        let result = TunDevice::create("a-name-longer-than-ifnamsiz");
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[tokio::test]
    async fn test_register_reports_readiness() {
        use std::os::unix::io::FromRawFd;

        let mut fds = [0; 2];
        let ret = unsafe { libc::pipe2(fds.as_mut_ptr(), libc::O_NONBLOCK | libc::O_CLOEXEC) };
        assert_eq!(ret, 0);
        let (reader, writer) = unsafe { (File::from_raw_fd(fds[0]), File::from_raw_fd(fds[1])) };

        let reader = register(reader).unwrap();
        let writer = register(writer).unwrap();

        let mut guard = writer.writable().await.unwrap();
        let sent = guard.try_io(|inner| inner.get_ref().write(b"ping")).unwrap().unwrap();
        assert_eq!(sent, 4);

        let mut buf = [0u8; 8];
        let mut guard = reader.readable().await.unwrap();
        let n = guard.try_io(|inner| inner.get_ref().read(&mut buf)).unwrap().unwrap();
        assert_eq!(&buf[..n], b"ping");
    }

    #[tokio::test]
    async fn test_rejects_empty_name() {
        assert!(matches!(TunDevice::create(""), Err(Error::Config(_))));
    }

    /// Requires CAP_NET_ADMIN
    #[tokio::test]
    #[ignore]
    async fn test_create_tun() {
        let dev = TunDevice::create("tunpatch-t0").expect("Failed to create TUN device");
        assert_eq!(dev.name(), "tunpatch-t0");
    }
}

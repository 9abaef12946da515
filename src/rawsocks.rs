use std::io;
use std::os::fd::OwnedFd;

#[cfg(target_os = "linux")]
pub use linux_impl::{interface_index, open_socket_rx};

#[cfg(not(target_os = "linux"))]
pub use unsupported_impl::{interface_index, open_socket_rx};

#[cfg(target_os = "linux")]
mod linux_impl {
    use std::{
        io, mem,
        os::fd::{AsRawFd, OwnedFd},
    };

    use libc::{packet_mreq, sockaddr_ll, ETH_ALEN, ETH_P_ALL, PACKET_MR_PROMISC, SOL_PACKET};
    use log::debug;
    use nix::{
        fcntl::{fcntl, FcntlArg, OFlag},
        net::if_::if_nametoindex,
        sys::socket::{socket, AddressFamily, SockFlag, SockProtocol, SockType},
    };

    pub fn interface_index(name: &str) -> io::Result<i32> {
        let index = if_nametoindex(name)?;
        Ok(index as i32)
    }

    /// Opens a promiscuous, non-blocking AF_PACKET socket bound to `ifindex`.
    /// The interface must already be in monitor mode for frames to carry radiotap.
    pub fn open_socket_rx(ifindex: i32) -> io::Result<OwnedFd> {
        let mut saddr: sockaddr_ll = unsafe { mem::zeroed() };
        let mut mrq: packet_mreq = unsafe { mem::zeroed() };

        let fd_socket_rx = socket(
            AddressFamily::Packet,
            SockType::Raw,
            SockFlag::SOCK_CLOEXEC,
            SockProtocol::EthAll,
        )?;

        mrq.mr_ifindex = ifindex;
        mrq.mr_type = PACKET_MR_PROMISC as u16;

        let ret = unsafe {
            libc::setsockopt(
                fd_socket_rx.as_raw_fd(),
                SOL_PACKET,
                libc::PACKET_ADD_MEMBERSHIP,
                &mrq as *const _ as *const libc::c_void,
                mem::size_of::<packet_mreq>() as libc::socklen_t,
            )
        };
        if ret < 0 {
            return Err(io::Error::last_os_error());
        }

        saddr.sll_family = libc::AF_PACKET as u16;
        saddr.sll_protocol = (ETH_P_ALL as u16).to_be();
        saddr.sll_ifindex = ifindex;
        saddr.sll_halen = ETH_ALEN as u8;

        let bind_ret = unsafe {
            libc::bind(
                fd_socket_rx.as_raw_fd(),
                (&saddr as *const libc::sockaddr_ll).cast(),
                mem::size_of::<sockaddr_ll>() as libc::socklen_t,
            )
        };
        if bind_ret < 0 {
            return Err(io::Error::last_os_error());
        }

        let socket_rx_flags = fcntl(fd_socket_rx.as_raw_fd(), FcntlArg::F_GETFL)?;
        let new_flags = OFlag::from_bits_truncate(socket_rx_flags | OFlag::O_NONBLOCK.bits());
        fcntl(fd_socket_rx.as_raw_fd(), FcntlArg::F_SETFL(new_flags))?;

        debug!("rx socket open on ifindex {}", ifindex);
        Ok(fd_socket_rx)
    }
}

#[cfg(not(target_os = "linux"))]
mod unsupported_impl {
    use std::{io, os::fd::OwnedFd};

    fn unsupported() -> io::Error {
        io::Error::new(
            io::ErrorKind::Unsupported,
            "live capture needs Linux AF_PACKET sockets",
        )
    }

    pub fn interface_index(_name: &str) -> io::Result<i32> {
        Err(unsupported())
    }

    pub fn open_socket_rx(_ifindex: i32) -> io::Result<OwnedFd> {
        Err(unsupported())
    }
}

/// Opens the receive socket for the interface called `name`.
pub fn open_interface(name: &str) -> io::Result<OwnedFd> {
    open_socket_rx(interface_index(name)?)
}

// ── Session seam ─────────────────────────────────────────────────────────────

use std::io::{self, Read, Write};

/// An established session able to launch the remote `scp` process.
///
/// The core never constructs, authenticates or closes a session; it only
/// borrows one for the duration of a single transfer.
pub trait ScpSession {
    type Outbound: Write;
    type Inbound: Read;

    /// Byte stream feeding the remote process's stdin.
    fn open_outbound(&mut self) -> io::Result<Self::Outbound>;

    /// Byte stream carrying the remote process's stdout.
    fn open_inbound(&mut self) -> io::Result<Self::Inbound>;

    /// Launch `command` on the remote side.
    fn start(&mut self, command: &str) -> io::Result<()>;
}

/// An `ssh2` channel opened by the caller (`Session::channel_session`).
/// Both directions use the channel's main data stream.
impl ScpSession for ssh2::Channel {
    type Outbound = ssh2::Stream;
    type Inbound = ssh2::Stream;

    fn open_outbound(&mut self) -> io::Result<ssh2::Stream> {
        Ok(self.stream(0))
    }

    fn open_inbound(&mut self) -> io::Result<ssh2::Stream> {
        Ok(self.stream(0))
    }

    fn start(&mut self, command: &str) -> io::Result<()> {
        self.exec(command).map_err(io::Error::from)
    }
}

/// Send EOF and close `channel`, waiting for the remote side to follow.
///
/// Callers that own the channel use this once the transfer is over so the
/// remote `scp` sees end of input and exits.
pub fn close_channel(channel: &mut ssh2::Channel) -> io::Result<()> {
    channel.send_eof().map_err(io::Error::from)?;
    channel.wait_eof().map_err(io::Error::from)?;
    channel.close().map_err(io::Error::from)?;
    channel.wait_close().map_err(io::Error::from)?;
    Ok(())
}

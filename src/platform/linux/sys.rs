use libc::c_int;
use nix::ioctl_write_ptr;

// TUNSETIFF is declared as _IOW('T', 202, int) but the kernel reads and
// writes back a whole `struct ifreq` through the pointer.
ioctl_write_ptr!(tunsetiff, b'T', 202, c_int);

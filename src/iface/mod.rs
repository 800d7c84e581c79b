/*! Network device description and session driving.

The `iface` module describes the network device a session configures, keeps
the running sessions in a `SessionSet`, and drives them through an
`Interface`.
*/

mod device;
mod interface;
mod session_set;

pub use self::device::{BusId, BusType, Device, LinkProtocol, MAX_LL_ADDR_LEN, MAX_NAME_LEN};
pub use self::interface::{Config, Context, Interface, Outcome};
pub use self::session_set::{SessionHandle, SessionSet, SessionStorage};

// Files-API access, per spec §4.3.
//
// `upstream` talks to the node agent's `/files/*` HTTP endpoints in terms
// of raw byte ranges; `reader` turns that into the same line-at-a-time
// pull interface the streaming handler drives journal reads through too.

mod reader;
mod upstream;

pub use reader::{FilesReader, FilesReaderBuilder};
pub use upstream::FilesApiClient;

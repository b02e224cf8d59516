//! Map layer management: color scales, legends, the rendering surface
//! abstraction, the layer reconciler, and pointer interaction.

pub mod interaction;
pub mod legend;
pub mod reconciler;
pub mod surface;
pub mod symbology;

pub use interaction::*;
pub use legend::*;
pub use reconciler::*;
pub use surface::*;
pub use symbology::*;

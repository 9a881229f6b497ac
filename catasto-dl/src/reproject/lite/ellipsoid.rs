//! Définition de l'ellipsoïde WGS84
//!
//! ETRS89 (GRS80) diffère de WGS84 de moins de 0.1 mm sur le demi-petit axe :
//! les zones UTM ETRS89 (258xx) utilisent les mêmes constantes.

/// Ellipsoïde WGS84
pub struct WGS84;

impl WGS84 {
    /// Demi-grand axe (rayon équatorial) en mètres
    pub const A: f64 = 6378137.0;

    /// Aplatissement
    pub const F: f64 = 1.0 / 298.257223563;

    /// Première excentricité au carré
    pub const E2: f64 = 2.0 * Self::F - Self::F * Self::F;

    /// Deuxième excentricité au carré
    pub const EP2: f64 = Self::E2 / (1.0 - Self::E2);
}

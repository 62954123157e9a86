//! Short Weierstrass curves used by GOST R 34.10 and their point arithmetic.
//!
//! Points are kept in Jacobian coordinates during scalar multiplication and
//! converted back to affine once at the end, so a single field inversion is
//! paid per multiplication.

use num_bigint_dig::BigUint;
use num_traits::{One, Zero};
use std::sync::OnceLock;

/// Affine point on a curve.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AffinePoint {
    pub x: BigUint,
    pub y: BigUint,
}

#[derive(Debug, Clone)]
struct JacobianPoint {
    x: BigUint,
    y: BigUint,
    z: BigUint,
}

impl JacobianPoint {
    fn infinity() -> Self {
        Self {
            x: BigUint::one(),
            y: BigUint::one(),
            z: BigUint::zero(),
        }
    }

    fn from_affine(p: &AffinePoint) -> Self {
        Self {
            x: p.x.clone(),
            y: p.y.clone(),
            z: BigUint::one(),
        }
    }

    fn is_infinity(&self) -> bool {
        self.z.is_zero()
    }
}

/// Curve `y^2 = x^3 + a*x + b (mod p)` with a base point of prime order `q`.
#[derive(Debug, Clone)]
pub struct Curve {
    pub name: &'static str,
    pub p: BigUint,
    pub a: BigUint,
    pub b: BigUint,
    pub q: BigUint,
    pub base: AffinePoint,
    /// Coordinate and scalar size in bytes
    pub size: usize,
    /// Group order divided by `q`
    pub cofactor: u32,
}

fn hex_int(s: &str) -> BigUint {
    BigUint::parse_bytes(s.as_bytes(), 16).unwrap_or_else(BigUint::zero)
}

/// Hex parameters of a curve.
pub(crate) struct CurveParams {
    pub name: &'static str,
    pub p: &'static str,
    /// `None` for `a = p - 3`
    pub a: Option<&'static str>,
    pub b: &'static str,
    pub q: &'static str,
    pub x: &'static str,
    pub y: &'static str,
    pub size: usize,
    pub cofactor: u32,
}

impl CurveParams {
    pub(crate) fn build(&self) -> Curve {
        let p = hex_int(self.p);
        let a = match self.a {
            Some(a) => hex_int(a),
            None => &p - BigUint::from(3u32),
        };
        Curve {
            name: self.name,
            a,
            b: hex_int(self.b),
            q: hex_int(self.q),
            base: AffinePoint {
                x: hex_int(self.x),
                y: hex_int(self.y),
            },
            p,
            size: self.size,
            cofactor: self.cofactor,
        }
    }
}

macro_rules! named_curve {
    ($(#[$doc:meta])* $fn_name:ident, $params:expr) => {
        $(#[$doc])*
        pub fn $fn_name() -> &'static Curve {
            static CURVE: OnceLock<Curve> = OnceLock::new();
            CURVE.get_or_init(|| $params.build())
        }
    };
}

const P_256A: &str = "FFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFD97";
const P_512A: &str = "FFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFF\
                      FFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFDC7";

named_curve!(
    /// id-GostR3410-2001-CryptoPro-A-ParamSet, also XchA and tc26 256 paramSetB.
    cryptopro_a,
    CurveParams {
        name: "CryptoPro-A",
        p: P_256A,
        a: None,
        b: "A6",
        q: "FFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFF6C611070995AD10045841B09B761B893",
        x: "1",
        y: "8D91E471E0989CDA27DF505A453F2B7635294F2DDF23E3B122ACC99C9E9F1E14",
        size: 32,
        cofactor: 1,
    }
);

named_curve!(
    /// id-GostR3410-2001-CryptoPro-B-ParamSet, also tc26 256 paramSetC.
    cryptopro_b,
    CurveParams {
        name: "CryptoPro-B",
        p: "8000000000000000000000000000000000000000000000000000000000000C99",
        a: None,
        b: "3E1AF419A269A5F866A7D3C25C3DF80AE979259373FF2B182F49D4CE7E1BBC8B",
        q: "800000000000000000000000000000015F700CFFF1A624E5E497161BCC8A198F",
        x: "1",
        y: "3FA8124359F96680B83D1C3EB2C070E5C545C9858D03ECFB744BF8D717717EFC",
        size: 32,
        cofactor: 1,
    }
);

named_curve!(
    /// id-GostR3410-2001-CryptoPro-C-ParamSet, also XchB and tc26 256 paramSetD.
    cryptopro_c,
    CurveParams {
        name: "CryptoPro-C",
        p: "9B9F605F5A858107AB1EC85E6B41C8AACF846E86789051D37998F7B9022D759B",
        a: None,
        b: "805A",
        q: "9B9F605F5A858107AB1EC85E6B41C8AA582CA3511EDDFB74F02F3A6598980BB9",
        x: "0",
        y: "41ECE55743711A8C3CBF3783CD08C0EE4D4DC440D4641A8F366E550DFDB3BB67",
        size: 32,
        cofactor: 1,
    }
);

named_curve!(
    /// id-tc26-gost-3410-12-256-paramSetA (twisted Edwards curve in
    /// Weierstrass form).
    tc26_256_a,
    CurveParams {
        name: "tc26-256-A",
        p: P_256A,
        a: Some("C2173F1513981673AF4892C23035A27CE25E2013BF95AA33B22C656F277E7335"),
        b: "295F9BAE7428ED9CCC20E7C359A9D41A22FCCD9108E17BF7BA9337A6F8AE9513",
        q: "400000000000000000000000000000000FD8CDDFC87B6635C115AF556C360C67",
        x: "91E38443A5E82C0D880923425712B2BB658B9196932E02C78B2582FE742DAA28",
        y: "32879423AB1A0375895786C4BB46E9565FDE0B5344766740AF268ADB32322E5C",
        size: 32,
        cofactor: 4,
    }
);

named_curve!(
    /// id-tc26-gost-3410-12-512-paramSetA.
    tc26_512_a,
    CurveParams {
        name: "tc26-512-A",
        p: P_512A,
        a: None,
        b: "00E8C2505DEDFC86DDC1BD0B2B6667F1DA34B82574761CB0E879BD081CFD0B62\
            65EE3CB090F30D27614CB4574010DA90DD862EF9D4EBEE4761503190785A71C760",
        q: "FFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFF\
            27E69532F48D89116FF22B8D4E0560609B4B38ABFAD2B85DCACDB1411F10B275",
        x: "3",
        y: "7503CFE87A836AE3A61B8816E25450E6CE5E1C93ACF1ABC1778064FDCBEFA921\
            DF1626BE4FD036E93D75E6A50E3A41E98028FE5FC235F5B889A589CB5215F2A4",
        size: 64,
        cofactor: 1,
    }
);

named_curve!(
    /// id-tc26-gost-3410-12-512-paramSetB.
    tc26_512_b,
    CurveParams {
        name: "tc26-512-B",
        p: "8000000000000000000000000000000000000000000000000000000000000000\
            000000000000000000000000000000000000000000000000000000000000006F",
        a: None,
        b: "687D1B459DC841457E3E06CF6F5E2517B97C7D614AF138BCBF85DC806C4B289F\
            3E965D2DB1416D217F8B276FAD1AB69C50F78BEE1FA3106EFB8CCBC7C5140116",
        q: "8000000000000000000000000000000000000000000000000000000000000001\
            49A1EC142565A545ACFDB77BD9D40CFA8B996712101BEA0EC6346C54374F25BD",
        x: "2",
        y: "1A8F7EDA389B094C2C071E3647A8940F3C123B697578C213BE6DD9E6C8EC7335\
            DCB228FD1EDF4A39152CBCAAF8C0398828041055F94CEEEC7E21340780FE41BD",
        size: 64,
        cofactor: 1,
    }
);

named_curve!(
    /// id-tc26-gost-3410-12-512-paramSetC (twisted Edwards curve in
    /// Weierstrass form).
    tc26_512_c,
    CurveParams {
        name: "tc26-512-C",
        p: P_512A,
        a: Some(
            "DC9203E514A721875485A529D2C722FB187BC8980EB866644DE41C68E1430645\
             46E861C0E2C9EDD92ADE71F46FCF50FF2AD97F951FDA9F2A2EB6546F39689BD3"
        ),
        b: "B4C4EE28CEBC6C2C8AC12952CF37F16AC7EFB6A9F69F4B57FFDA2E4F0DE5ADE0\
            38CBC2FFF719D2C18DE0284B8BFEF3B52B8CC7A5F5BF0A3C8D2319A5312557E1",
        q: "3FFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFF\
            C98CDBA46506AB004C33A9FF5147502CC8EDA9E7A769A12694623CEF47F023ED",
        x: "E2E31EDFC23DE7BDEBE241CE593EF5DE2295B7A9CBAEF021D385F7074CEA043A\
            A27272A7AE602BF2A7B9033DB9ED3610C6FB85487EAE97AAC5BC7928C1950148",
        y: "F5CE40D95B5EB899ABBCCFF5911CB8577939804D6527378B8C108C3D2090FF9B\
            E18E2D33E3021ED2EF32D85822423B6304F726AA854BAE07D0396E9A9ADDC40F",
        size: 64,
        cofactor: 4,
    }
);

impl Curve {
    fn add_mod(&self, a: &BigUint, b: &BigUint) -> BigUint {
        (a + b) % &self.p
    }

    fn sub_mod(&self, a: &BigUint, b: &BigUint) -> BigUint {
        ((a + &self.p) - (b % &self.p)) % &self.p
    }

    fn mul_mod(&self, a: &BigUint, b: &BigUint) -> BigUint {
        (a * b) % &self.p
    }

    fn inv_mod(&self, a: &BigUint) -> BigUint {
        let exp = &self.p - BigUint::from(2u32);
        a.modpow(&exp, &self.p)
    }

    /// Check the curve equation for an affine point.
    #[must_use]
    pub fn contains(&self, point: &AffinePoint) -> bool {
        if point.x >= self.p || point.y >= self.p {
            return false;
        }
        let lhs = self.mul_mod(&point.y, &point.y);
        let x2 = self.mul_mod(&point.x, &point.x);
        let x3 = self.mul_mod(&x2, &point.x);
        let ax = self.mul_mod(&self.a, &point.x);
        let rhs = self.add_mod(&self.add_mod(&x3, &ax), &self.b);
        lhs == rhs
    }

    fn double(&self, pt: &JacobianPoint) -> JacobianPoint {
        if pt.is_infinity() || pt.y.is_zero() {
            return JacobianPoint::infinity();
        }
        let y2 = self.mul_mod(&pt.y, &pt.y);
        let s = self.mul_mod(&BigUint::from(4u32), &self.mul_mod(&pt.x, &y2));
        let z2 = self.mul_mod(&pt.z, &pt.z);
        let z4 = self.mul_mod(&z2, &z2);
        let x2 = self.mul_mod(&pt.x, &pt.x);
        let m = self.add_mod(
            &self.mul_mod(&BigUint::from(3u32), &x2),
            &self.mul_mod(&self.a, &z4),
        );
        let x3 = self.sub_mod(&self.mul_mod(&m, &m), &self.add_mod(&s, &s));
        let y4 = self.mul_mod(&y2, &y2);
        let y3 = self.sub_mod(
            &self.mul_mod(&m, &self.sub_mod(&s, &x3)),
            &self.mul_mod(&BigUint::from(8u32), &y4),
        );
        let z3 = self.mul_mod(&BigUint::from(2u32), &self.mul_mod(&pt.y, &pt.z));
        JacobianPoint {
            x: x3,
            y: y3,
            z: z3,
        }
    }

    fn add(&self, p1: &JacobianPoint, p2: &JacobianPoint) -> JacobianPoint {
        if p1.is_infinity() {
            return p2.clone();
        }
        if p2.is_infinity() {
            return p1.clone();
        }
        let z1z1 = self.mul_mod(&p1.z, &p1.z);
        let z2z2 = self.mul_mod(&p2.z, &p2.z);
        let u1 = self.mul_mod(&p1.x, &z2z2);
        let u2 = self.mul_mod(&p2.x, &z1z1);
        let s1 = self.mul_mod(&p1.y, &self.mul_mod(&p2.z, &z2z2));
        let s2 = self.mul_mod(&p2.y, &self.mul_mod(&p1.z, &z1z1));
        if u1 == u2 {
            return if s1 == s2 {
                self.double(p1)
            } else {
                JacobianPoint::infinity()
            };
        }
        let h = self.sub_mod(&u2, &u1);
        let r = self.sub_mod(&s2, &s1);
        let h2 = self.mul_mod(&h, &h);
        let h3 = self.mul_mod(&h2, &h);
        let u1h2 = self.mul_mod(&u1, &h2);
        let x3 = self.sub_mod(
            &self.sub_mod(&self.mul_mod(&r, &r), &h3),
            &self.add_mod(&u1h2, &u1h2),
        );
        let y3 = self.sub_mod(
            &self.mul_mod(&r, &self.sub_mod(&u1h2, &x3)),
            &self.mul_mod(&s1, &h3),
        );
        let z3 = self.mul_mod(&h, &self.mul_mod(&p1.z, &p2.z));
        JacobianPoint {
            x: x3,
            y: y3,
            z: z3,
        }
    }

    fn to_affine(&self, pt: &JacobianPoint) -> Option<AffinePoint> {
        if pt.is_infinity() {
            return None;
        }
        let zinv = self.inv_mod(&pt.z);
        let zinv2 = self.mul_mod(&zinv, &zinv);
        let zinv3 = self.mul_mod(&zinv2, &zinv);
        Some(AffinePoint {
            x: self.mul_mod(&pt.x, &zinv2),
            y: self.mul_mod(&pt.y, &zinv3),
        })
    }

    fn mul_jacobian(&self, k: &BigUint, point: &AffinePoint) -> JacobianPoint {
        let base = JacobianPoint::from_affine(point);
        let mut acc = JacobianPoint::infinity();
        if k.is_zero() {
            return acc;
        }
        for byte in k.to_bytes_be() {
            for bit in (0..8).rev() {
                acc = self.double(&acc);
                if (byte >> bit) & 1 == 1 {
                    acc = self.add(&acc, &base);
                }
            }
        }
        acc
    }

    /// `k * point`, `None` for the point at infinity.
    #[must_use]
    pub fn mul(&self, k: &BigUint, point: &AffinePoint) -> Option<AffinePoint> {
        self.to_affine(&self.mul_jacobian(k, point))
    }

    /// `k * G` for the base point.
    #[must_use]
    pub fn mul_base(&self, k: &BigUint) -> Option<AffinePoint> {
        self.mul(k, &self.base)
    }

    /// `k1 * p1 + k2 * p2`.
    #[must_use]
    pub fn mul_add(
        &self,
        k1: &BigUint,
        p1: &AffinePoint,
        k2: &BigUint,
        p2: &AffinePoint,
    ) -> Option<AffinePoint> {
        let a = self.mul_jacobian(k1, p1);
        let b = self.mul_jacobian(k2, p2);
        self.to_affine(&self.add(&a, &b))
    }
}

/// Big-endian encoding left-padded to `len` bytes.
#[must_use]
pub fn to_fixed_be(n: &BigUint, len: usize) -> Vec<u8> {
    let bytes = n.to_bytes_be();
    if bytes.len() >= len {
        return bytes[bytes.len() - len..].to_vec();
    }
    let mut out = vec![0u8; len - bytes.len()];
    out.extend_from_slice(&bytes);
    out
}

/// Little-endian encoding right-padded to `len` bytes.
#[must_use]
pub fn to_fixed_le(n: &BigUint, len: usize) -> Vec<u8> {
    let mut out = to_fixed_be(n, len);
    out.reverse();
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn all_curves() -> [&'static Curve; 7] {
        [
            cryptopro_a(),
            cryptopro_b(),
            cryptopro_c(),
            tc26_256_a(),
            tc26_512_a(),
            tc26_512_b(),
            tc26_512_c(),
        ]
    }

    #[test]
    fn test_base_points_on_curve() {
        for curve in all_curves() {
            assert!(curve.contains(&curve.base), "{} base point", curve.name);
            assert_eq!(curve.p.bits(), curve.size * 8);
        }
    }

    #[test]
    fn test_base_point_order() {
        for curve in all_curves() {
            assert!(curve.mul_base(&curve.q).is_none(), "{} order", curve.name);
            let q_minus_1 = &curve.q - BigUint::one();
            let neg_g = curve.mul_base(&q_minus_1).unwrap();
            assert_eq!(neg_g.x, curve.base.x);
            assert_eq!(neg_g.y, &curve.p - &curve.base.y);
        }
    }

    #[test]
    fn test_scalar_mul_consistency() {
        let curve = cryptopro_a();
        let k1 = BigUint::from(123_456_789u64);
        let k2 = BigUint::from(987_654_321u64);
        let sum = curve.mul_base(&(&k1 + &k2)).unwrap();
        let p1 = curve.mul_base(&k1).unwrap();
        let combined = curve
            .mul_add(&BigUint::one(), &p1, &k2, &curve.base)
            .unwrap();
        assert_eq!(sum, combined);
        assert!(curve.contains(&sum));
    }

    #[test]
    fn test_doubling_matches_addition() {
        let curve = tc26_512_a();
        let two_g = curve.mul_base(&BigUint::from(2u32)).unwrap();
        let g_plus_g = curve
            .mul_add(&BigUint::one(), &curve.base, &BigUint::one(), &curve.base)
            .unwrap();
        assert_eq!(two_g, g_plus_g);
    }

    #[test]
    fn test_fixed_encodings() {
        let n = BigUint::from(0x0102u32);
        assert_eq!(to_fixed_be(&n, 4), vec![0, 0, 1, 2]);
        assert_eq!(to_fixed_le(&n, 4), vec![2, 1, 0, 0]);
        assert_eq!(to_fixed_be(&BigUint::zero(), 2), vec![0, 0]);
    }
}
